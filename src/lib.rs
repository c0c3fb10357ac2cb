#![allow(clippy::style)]
#![allow(clippy::complexity)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::mutable_key_type)]
#![allow(clippy::stable_sort_primitive)]
#![allow(clippy::map_entry)]
#![allow(clippy::box_default)]
#![warn(clippy::bool_comparison)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::no_effect)]
#![warn(clippy::unnecessary_unwrap)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::todo)]
#![warn(clippy::wildcard_dependencies)]
#![warn(clippy::zero_prefixed_literal)]
#![warn(clippy::borrowed_box)]
#![warn(clippy::deref_addrof)]
#![warn(clippy::double_must_use)]
#![warn(clippy::double_parens)]
#![warn(clippy::extra_unused_lifetimes)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_question_mark)]
#![warn(clippy::needless_return)]
#![warn(clippy::redundant_pattern)]
#![warn(clippy::redundant_slicing)]
#![warn(clippy::redundant_static_lifetimes)]
#![warn(clippy::single_component_path_imports)]
#![warn(clippy::unnecessary_cast)]
#![warn(clippy::useless_asref)]
#![warn(clippy::useless_conversion)]
#![warn(clippy::builtin_type_shadow)]
#![warn(clippy::duplicate_underscore_argument)]
#![warn(double_negations)]
#![warn(clippy::unnecessary_mut_passed)]
#![warn(clippy::wildcard_in_or_patterns)]
#![warn(clippy::crosspointer_transmute)]
#![warn(clippy::excessive_precision)]
#![warn(clippy::panicking_overflow_checks)]
#![warn(clippy::as_conversions)]
#![warn(clippy::match_overlapping_arm)]
#![warn(clippy::zero_divided_by_zero)]
#![warn(clippy::must_use_unit)]
#![warn(clippy::suspicious_assignment_formatting)]
#![warn(clippy::suspicious_else_formatting)]
#![warn(clippy::suspicious_unary_op_formatting)]
#![warn(clippy::mut_mutex_lock)]
#![warn(clippy::print_literal)]
#![warn(clippy::same_item_push)]
#![warn(clippy::useless_format)]
#![warn(clippy::write_literal)]
#![warn(clippy::redundant_closure)]
#![warn(clippy::redundant_closure_call)]
#![warn(clippy::unnecessary_lazy_evaluations)]
#![warn(clippy::partialeq_ne_impl)]
#![warn(clippy::redundant_field_names)]
#![warn(clippy::transmutes_expressible_as_ptr_casts)]
#![warn(clippy::unused_async)]
#![warn(clippy::disallowed_methods)]
#![warn(clippy::disallowed_macros)]
#![warn(clippy::disallowed_types)]
#![warn(clippy::from_over_into)]

//! Utilities for exercising and debugging the Pod Security admission label
//! synchronization controller against a live cluster.
//!
//! The main piece is the violation audit: every namespace is updated with
//! `dryRun=All` to enforce its current audit level, the API server's warning
//! headers are intercepted by a [`WarningLayer`](warning::WarningLayer) and
//! grouped per namespace and pod by a
//! [`WarningAggregator`](violations::WarningAggregator), and the violating
//! pods are traced back to their Deployments:
//!
//! ```no_run
//! # use psa_sync_tools::{audit::Auditor, config, violations::render_report};
//! # async fn foo() -> psa_sync_tools::Result<()> {
//! let config = config::load_config(None).await?;
//! let auditor = Auditor::new(config, None)?;
//! let violations = auditor.run().await?;
//! print!("{}", render_report(&violations));
//! # Ok(())
//! # }
//! ```
//!
//! The aggregator can also be used on its own with any warning source:
//!
//! ```
//! use psa_sync_tools::violations::WarningAggregator;
//! use psa_sync_tools::warning::WarningHandler;
//!
//! let aggregator = WarningAggregator::new();
//! aggregator.handle_warning_header(
//!     299,
//!     "-",
//!     r#"existing pods in namespace "p0t-sekurity" violate the new PodSecurity enforce level "restricted:latest""#,
//! );
//! aggregator.handle_warning_header(
//!     299,
//!     "-",
//!     "p0t-sekurity: allowPrivilegeEscalation != false, unrestricted capabilities",
//! );
//!
//! let violations = aggregator.take_violations();
//! assert_eq!(violations[0].pod_violations[0].violations.len(), 2);
//! ```
//!
//! The remaining modules back the other subcommands of the `psa-sync-tools`
//! binary: [`namespace`] walks through server-side apply of namespace labels,
//! [`logs`] creates test fixtures and searches pod logs for the controller,
//! and [`render`] produces SCC and seccomp experiment manifests.

pub mod audit;
pub mod config;
mod error;
pub mod logs;
pub mod namespace;
pub mod render;
pub mod retry;
pub mod violations;
pub mod warning;

pub use error::{Error, Result};
