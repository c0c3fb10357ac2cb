use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use serde::{Serialize, Serializer};

use super::parser::{WarningMessage, WarningParseError};

/// A namespace whose existing pods would fail a stricter enforce level.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamespaceViolation {
    pub namespace: String,
    /// The enforce level that was requested, e.g. `restricted:latest`.
    pub level: String,
    /// Pods in arrival order. Serialized as `null` when there are none.
    #[serde(serialize_with = "empty_as_null")]
    pub pod_violations: Vec<PodViolation>,
}

fn empty_as_null<S: Serializer>(pods: &[PodViolation], serializer: S) -> Result<S::Ok, S::Error> {
    if pods.is_empty() {
        serializer.serialize_none()
    } else {
        pods.serialize(serializer)
    }
}

/// A single pod and the policy checks it fails.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PodViolation {
    pub name: String,
    /// Deployment that ultimately owns the pod, filled in by
    /// [`resolve_owners`](super::resolve_owners).
    pub deployment: Option<Deployment>,
    pub pod: Option<Pod>,
    pub violations: Vec<String>,
}

/// Accumulates parsed warnings into namespace and pod violations.
///
/// Pod warnings carry no namespace, so they are attached to the namespace
/// opened by the most recent namespace warning. Only a new namespace warning
/// changes that context.
#[derive(Debug, Default)]
pub struct ViolationTree {
    namespaces: Vec<NamespaceViolation>,
    current: Option<usize>,
}

impl ViolationTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `message` to the tree. A pod message with no namespace context
    /// leaves the tree untouched and fails with
    /// [`WarningParseError::OutOfOrderWarning`].
    pub fn record(&mut self, message: WarningMessage) -> Result<(), WarningParseError> {
        match message {
            WarningMessage::Namespace { namespace, level } => {
                self.namespaces.push(NamespaceViolation {
                    namespace,
                    level,
                    pod_violations: Vec::new(),
                });
                self.current = Some(self.namespaces.len() - 1);
            }
            WarningMessage::Pod { name, violations } => {
                let current = match self.current {
                    Some(index) => &mut self.namespaces[index],
                    None => return Err(WarningParseError::OutOfOrderWarning { pod: name }),
                };
                current.pod_violations.push(PodViolation {
                    name,
                    violations,
                    ..Default::default()
                });
            }
        }
        Ok(())
    }

    /// The namespace violation that pod warnings are currently attached to.
    pub fn current(&self) -> Option<&NamespaceViolation> {
        self.current.map(|index| &self.namespaces[index])
    }

    pub fn violations(&self) -> &[NamespaceViolation] {
        &self.namespaces
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }

    pub fn into_violations(self) -> Vec<NamespaceViolation> {
        self.namespaces
    }
}
