use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::Resource as _;
use kube::api::Api;
use kube::{Client, Resource};
use tracing::{event, Level};

use super::tree::NamespaceViolation;
use crate::error::{Error, Result};

/// Read access to the objects needed to walk a pod's ownership chain.
#[async_trait::async_trait]
pub trait OwnerLookup {
    async fn pod(&self, namespace: &str, name: &str) -> Result<Pod>;
    async fn replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet>;
    async fn deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;
}

#[async_trait::async_trait]
impl OwnerLookup for Client {
    async fn pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        Api::<Pod>::namespaced(self.clone(), namespace)
            .get(name)
            .await
            .map_err(Error::kube("getting pod"))
    }

    async fn replica_set(&self, namespace: &str, name: &str) -> Result<ReplicaSet> {
        Api::<ReplicaSet>::namespaced(self.clone(), namespace)
            .get(name)
            .await
            .map_err(Error::kube("getting replica set"))
    }

    async fn deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        Api::<Deployment>::namespaced(self.clone(), namespace)
            .get(name)
            .await
            .map_err(Error::kube("getting deployment"))
    }
}

/// Fetches every violating pod and the Deployment that owns it, either
/// directly or through a ReplicaSet. Pods owned by anything else keep an
/// empty `deployment`.
///
/// The first lookup error aborts the pass; pods already resolved keep what
/// was filled in.
pub async fn resolve_owners<L>(lookup: &L, violations: &mut [NamespaceViolation]) -> Result<()>
where
    L: OwnerLookup + Sync + ?Sized,
{
    for violation in violations.iter_mut() {
        let namespace = violation.namespace.as_str();
        for pod_violation in violation.pod_violations.iter_mut() {
            let pod = lookup.pod(namespace, &pod_violation.name).await?;
            let deployment = owning_deployment(lookup, namespace, &pod).await?;
            if deployment.is_none() {
                event!(
                    Level::DEBUG,
                    namespace,
                    pod = %pod_violation.name,
                    "Pod is not owned by a Deployment."
                );
            }
            pod_violation.pod = Some(pod);
            pod_violation.deployment = deployment;
        }
    }
    Ok(())
}

async fn owning_deployment<L>(lookup: &L, namespace: &str, pod: &Pod) -> Result<Option<Deployment>>
where
    L: OwnerLookup + Sync + ?Sized,
{
    match first_owner(pod) {
        Some(owner) if owner.kind == Deployment::KIND => {
            Ok(Some(lookup.deployment(namespace, &owner.name).await?))
        }
        Some(owner) if owner.kind == ReplicaSet::KIND => {
            let replica_set = lookup.replica_set(namespace, &owner.name).await?;
            match first_owner(&replica_set) {
                Some(owner) if owner.kind == Deployment::KIND => {
                    Ok(Some(lookup.deployment(namespace, &owner.name).await?))
                }
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

fn first_owner<K: Resource>(object: &K) -> Option<&OwnerReference> {
    object.meta().owner_references.as_ref()?.first()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;
    use crate::violations::PodViolation;

    #[derive(Default)]
    struct FakeCluster {
        pods: BTreeMap<String, Pod>,
        replica_sets: BTreeMap<String, ReplicaSet>,
        deployments: BTreeMap<String, Deployment>,
    }

    fn missing(kind: &'static str, name: &str) -> Error {
        Error::MissingField {
            kind,
            name: name.to_string(),
            field: "object",
        }
    }

    #[async_trait::async_trait]
    impl OwnerLookup for FakeCluster {
        async fn pod(&self, _namespace: &str, name: &str) -> Result<Pod> {
            self.pods.get(name).cloned().ok_or_else(|| missing("Pod", name))
        }

        async fn replica_set(&self, _namespace: &str, name: &str) -> Result<ReplicaSet> {
            self.replica_sets
                .get(name)
                .cloned()
                .ok_or_else(|| missing("ReplicaSet", name))
        }

        async fn deployment(&self, _namespace: &str, name: &str) -> Result<Deployment> {
            self.deployments
                .get(name)
                .cloned()
                .ok_or_else(|| missing("Deployment", name))
        }
    }

    fn meta(name: &str, owner: Option<(&str, &str)>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("apps".to_string()),
            owner_references: owner.map(|(kind, owner_name)| {
                vec![OwnerReference {
                    api_version: "apps/v1".to_string(),
                    kind: kind.to_string(),
                    name: owner_name.to_string(),
                    uid: format!("{owner_name}-uid"),
                    ..Default::default()
                }]
            }),
            ..Default::default()
        }
    }

    fn cluster() -> FakeCluster {
        let mut cluster = FakeCluster::default();
        for (pod, owner) in [
            ("web-abc-1", Some(("ReplicaSet", "web-abc"))),
            ("direct-1", Some(("Deployment", "direct"))),
            ("bare", None),
            ("db-0", Some(("StatefulSet", "db"))),
            ("loose-1", Some(("ReplicaSet", "loose"))),
        ] {
            cluster.pods.insert(
                pod.to_string(),
                Pod {
                    metadata: meta(pod, owner),
                    ..Default::default()
                },
            );
        }
        cluster.replica_sets.insert(
            "web-abc".to_string(),
            ReplicaSet {
                metadata: meta("web-abc", Some(("Deployment", "web"))),
                ..Default::default()
            },
        );
        cluster.replica_sets.insert(
            "loose".to_string(),
            ReplicaSet {
                metadata: meta("loose", None),
                ..Default::default()
            },
        );
        for deployment in ["web", "direct", "web-abc"] {
            cluster.deployments.insert(
                deployment.to_string(),
                Deployment {
                    metadata: meta(deployment, None),
                    ..Default::default()
                },
            );
        }
        cluster
    }

    fn violations(pods: &[&str]) -> Vec<NamespaceViolation> {
        vec![NamespaceViolation {
            namespace: "apps".to_string(),
            level: "restricted:latest".to_string(),
            pod_violations: pods
                .iter()
                .map(|name| PodViolation {
                    name: name.to_string(),
                    violations: vec!["seccompProfile".to_string()],
                    ..Default::default()
                })
                .collect(),
        }]
    }

    fn deployment_name(violation: &PodViolation) -> Option<&str> {
        violation
            .deployment
            .as_ref()
            .and_then(|d| d.metadata.name.as_deref())
    }

    #[tokio::test]
    async fn replica_set_owner_resolves_to_its_deployment() {
        let mut violations = violations(&["web-abc-1"]);
        resolve_owners(&cluster(), &mut violations).await.unwrap();

        let pod = &violations[0].pod_violations[0];
        assert_eq!(deployment_name(pod), Some("web"));
        assert_eq!(
            pod.pod.as_ref().and_then(|p| p.metadata.name.as_deref()),
            Some("web-abc-1")
        );
    }

    #[tokio::test]
    async fn direct_deployment_owner_is_fetched() {
        let mut violations = violations(&["direct-1"]);
        resolve_owners(&cluster(), &mut violations).await.unwrap();
        assert_eq!(deployment_name(&violations[0].pod_violations[0]), Some("direct"));
    }

    #[tokio::test]
    async fn pods_without_deployment_owner_stay_unresolved() {
        let mut violations = violations(&["bare", "db-0", "loose-1"]);
        resolve_owners(&cluster(), &mut violations).await.unwrap();

        for pod in &violations[0].pod_violations {
            assert!(pod.pod.is_some());
            assert_eq!(deployment_name(pod), None);
        }
    }

    #[tokio::test]
    async fn lookup_failure_aborts_the_pass() {
        let mut violations = violations(&["direct-1", "gone", "web-abc-1"]);
        let err = resolve_owners(&cluster(), &mut violations).await.unwrap_err();

        assert!(err.to_string().contains("gone"));
        assert!(violations[0].pod_violations[0].deployment.is_some());
        assert!(violations[0].pod_violations[2].pod.is_none());
    }
}
