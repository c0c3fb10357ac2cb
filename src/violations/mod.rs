//! Pod Security violations reported by the API server.
//!
//! When a namespace is updated to a stricter `enforce` level, the server
//! answers with one warning naming the namespace and level, followed by one
//! warning per existing pod that would be rejected:
//!
//! ```text
//! existing pods in namespace "p0t-sekurity" violate the new PodSecurity enforce level "restricted:latest"
//! p0t-sekurity: allowPrivilegeEscalation != false, unrestricted capabilities
//! ```
//!
//! [`WarningAggregator`] collects these into [`NamespaceViolation`]s,
//! [`resolve_owners`] attaches the live pods and their Deployments, and
//! [`render_report`] turns the result into JSON.

mod aggregator;
mod parser;
mod report;
mod resolver;
mod tree;

pub use aggregator::WarningAggregator;
pub use parser::{WarningMessage, WarningParseError, NAMESPACE_WARNING_PREFIX};
pub use report::render_report;
pub use resolver::{resolve_owners, OwnerLookup};
pub use tree::{NamespaceViolation, PodViolation, ViolationTree};
