//! Dry-run the `enforce` level of every namespace at its `audit` level and
//! collect the pods that would be rejected.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams, PostParams};
use kube::{Client, Config, ResourceExt};
use tracing::{event, Level};

use crate::error::{Error, Result};
use crate::violations::{resolve_owners, NamespaceViolation, WarningAggregator};
use crate::warning::{client_with_warnings, WarningHandler};

pub const AUDIT_LABEL: &str = "pod-security.kubernetes.io/audit";
pub const ENFORCE_LABEL: &str = "pod-security.kubernetes.io/enforce";
pub const WARN_LABEL: &str = "pod-security.kubernetes.io/warn";

/// Level used when a namespace has no audit label.
pub const DEFAULT_LEVEL: &str = "restricted";

/// Returns a copy of `namespace` whose enforce label is raised to its audit
/// label, or to [`DEFAULT_LEVEL`] if it has none.
pub fn stricter_namespace(namespace: &Namespace) -> Namespace {
    let mut stricter = namespace.clone();
    let labels = stricter.metadata.labels.get_or_insert_with(BTreeMap::new);
    let level = labels
        .get(AUDIT_LABEL)
        .filter(|level| !level.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());
    labels.insert(ENFORCE_LABEL.to_string(), level);
    stricter
}

/// Issues the dry-run updates through a client whose warnings feed a
/// [`WarningAggregator`].
pub struct Auditor {
    client: Client,
    aggregator: Arc<WarningAggregator>,
}

impl Auditor {
    /// Builds a client from `config`. Warnings are also passed to `inner`
    /// when given.
    pub fn new(config: Config, inner: Option<Arc<dyn WarningHandler>>) -> Result<Self> {
        let aggregator = Arc::new(match inner {
            Some(inner) => WarningAggregator::with_inner(inner),
            None => WarningAggregator::new(),
        });
        let client = client_with_warnings(config, Arc::clone(&aggregator))?;
        Ok(Self { client, aggregator })
    }

    /// Uses an existing client. `client` must deliver its warnings to
    /// `aggregator`.
    pub fn with_client(client: Client, aggregator: Arc<WarningAggregator>) -> Self {
        Self { client, aggregator }
    }

    /// Updates every namespace one at a time with `dryRun=All`, then looks up
    /// the pods and Deployments behind the collected violations.
    pub async fn run(&self) -> Result<Vec<NamespaceViolation>> {
        let api = Api::<Namespace>::all(self.client.clone());
        let namespaces = api
            .list(&ListParams::default())
            .await
            .map_err(Error::kube("listing namespaces"))?;

        let params = PostParams {
            dry_run: true,
            ..Default::default()
        };
        for namespace in &namespaces.items {
            let name = namespace.name_any();
            let stricter = stricter_namespace(namespace);
            api.replace(&name, &params, &stricter)
                .await
                .map_err(Error::kube("dry-run updating namespace"))?;
            event!(
                Level::DEBUG,
                namespace = %name,
                level = stricter.labels().get(ENFORCE_LABEL).map(String::as_str),
                "Dry-run enforce update accepted."
            );
        }

        let mut violations = self.aggregator.take_violations();
        event!(
            Level::INFO,
            namespaces = namespaces.items.len(),
            violating = violations.len(),
            "Collected PodSecurity violations."
        );
        resolve_owners(&self.client, &mut violations).await?;
        Ok(violations)
    }
}
