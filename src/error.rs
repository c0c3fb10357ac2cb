use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by the utilities in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Error from the Kubernetes client
    #[error("kubernetes error while {context}: {source}")]
    Kube {
        context: &'static str,
        #[source]
        source: kube::Error,
    },

    /// The kubeconfig could not be read or turned into a client config
    #[error("failed to load kubeconfig {path:?}: {message}")]
    Kubeconfig {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("invalid log pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("error waiting for {what}: {source}")]
    Wait {
        what: String,
        #[source]
        source: kube_runtime::wait::Error,
    },

    /// A wait on cluster state ran out of time
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    /// A server object was missing a field this tool depends on
    #[error("{kind} {name:?} is missing {field}")]
    MissingField {
        kind: &'static str,
        name: String,
        field: &'static str,
    },
}

impl Error {
    /// Wraps a kube error with a short description of what was being done.
    pub fn kube(context: &'static str) -> impl FnOnce(kube::Error) -> Self {
        move |source| Error::Kube { context, source }
    }

    pub fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io { path, source }
    }

    /// Returns true when the underlying API error is an HTTP 409 conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(response),
                ..
            } if response.code == 409
        )
    }
}

/// Result type for this crate
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "boom".into(),
            reason: "Conflict".into(),
            code,
        })
    }

    #[test]
    fn conflict_is_detected_only_for_409() {
        assert!(Error::kube("getting namespace")(api_error(409)).is_conflict());
        assert!(!Error::kube("getting namespace")(api_error(404)).is_conflict());
    }

    #[test]
    fn kube_error_carries_context() {
        let err = Error::kube("creating namespace")(api_error(500));
        assert!(err.to_string().contains("creating namespace"));
    }
}
