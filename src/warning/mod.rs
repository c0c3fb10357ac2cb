//! Interception of API server warnings.
//!
//! The Kubernetes API server reports policy problems, such as workloads that
//! would violate a stricter Pod Security level, through `Warning` response
//! headers. [`WarningLayer`] plugs into the kube client's tower stack and
//! forwards each of them to a [`WarningHandler`].

mod handler;
mod header;
mod layer;

pub use handler::{LogWarnings, NoWarnings, WarningHandler};
pub use header::{parse_warning_header, WarningHeader, WarningHeaderError};
pub use layer::{client_with_warnings, dispatch_warnings, WarningLayer, WarningService};

#[cfg(test)]
pub(crate) use handler::tests::Spy;
