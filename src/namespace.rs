//! Server-side apply of namespace labels, and what the API server then
//! records as owned by the applying field manager.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{event, Level};

use crate::error::{Error, Result};
use crate::retry::{retry_on_conflict, DEFAULT_RETRY};

pub const DEFAULT_FIELD_MANAGER: &str = "psa-sync-tools";

const APPLY_OPERATION: &str = "Apply";

/// `test-namespace-YYYYMMDD-HHMMSS`
pub fn test_namespace_name(now: DateTime<Local>) -> String {
    format!("test-namespace-{}", now.format("%Y%m%d-%H%M%S"))
}

/// Creates `name` with `labels` and waits until it can be read back.
pub async fn create_namespace(
    client: &Client,
    name: &str,
    labels: BTreeMap<String, String>,
    field_manager: Option<&str>,
) -> Result<Namespace> {
    let api = Api::<Namespace>::all(client.clone());
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: (!labels.is_empty()).then_some(labels),
            ..Default::default()
        },
        ..Default::default()
    };
    let params = PostParams {
        field_manager: field_manager.map(str::to_string),
        ..Default::default()
    };
    api.create(&params, &namespace)
        .await
        .map_err(Error::kube("creating namespace"))?;

    let api = &api;
    let created = retry_on_conflict(DEFAULT_RETRY, || async move {
        api.get(name)
            .await
            .map_err(Error::kube("waiting for namespace to be created"))
    })
    .await?;
    event!(Level::INFO, namespace = name, "Created namespace.");
    Ok(created)
}

pub async fn get_namespace(client: &Client, name: &str) -> Result<Namespace> {
    Api::<Namespace>::all(client.clone())
        .get(name)
        .await
        .map_err(Error::kube("getting namespace"))
}

/// Applies `labels` to `name` with server-side apply as `field_manager`.
pub async fn apply_labels(
    client: &Client,
    name: &str,
    field_manager: &str,
    labels: &BTreeMap<String, String>,
) -> Result<Namespace> {
    let patch = json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": labels,
        },
    });
    let applied = Api::<Namespace>::all(client.clone())
        .patch(name, &PatchParams::apply(field_manager), &Patch::Apply(&patch))
        .await
        .map_err(Error::kube("applying configuration"))?;
    event!(
        Level::INFO,
        namespace = name,
        field_manager,
        "Applied namespace labels."
    );
    Ok(applied)
}

pub async fn delete_namespace(client: &Client, name: &str) -> Result<()> {
    Api::<Namespace>::all(client.clone())
        .delete(name, &DeleteParams::default())
        .await
        .map_err(Error::kube("deleting namespace"))?;
    event!(Level::INFO, namespace = name, "Deleted namespace.");
    Ok(())
}

/// The labels `field_manager` owns through server-side apply, with their
/// current values.
pub fn owned_labels(namespace: &Namespace, field_manager: &str) -> BTreeMap<String, String> {
    let labels = namespace.labels();
    namespace
        .managed_fields()
        .iter()
        .filter(|entry| entry.manager.as_deref() == Some(field_manager))
        .filter(|entry| entry.operation.as_deref() == Some(APPLY_OPERATION))
        .filter_map(|entry| entry.fields_v1.as_ref())
        .filter_map(|fields| fields.0.get("f:metadata")?.get("f:labels")?.as_object())
        .flat_map(|owned| owned.keys())
        .filter_map(|key| key.strip_prefix("f:"))
        .filter_map(|key| Some((key.to_string(), labels.get(key)?.clone())))
        .collect()
}

/// One `- key: value` line per label, after `header`.
pub fn format_labels(header: &str, labels: &BTreeMap<String, String>) -> String {
    let mut out = format!("---\n{header}\n");
    for (key, value) in labels {
        out.push_str(&format!("- {key}: {value}\n"));
    }
    out
}

/// Creates a scratch namespace, applies a label to it as `field_manager`,
/// prints its labels before and after, prints what `field_manager` owns,
/// and deletes it again.
pub async fn apply_walkthrough(client: &Client, field_manager: &str) -> Result<()> {
    let name = test_namespace_name(Local::now());
    let initial = BTreeMap::from([("foo".to_string(), "bar".to_string())]);
    create_namespace(client, &name, initial, None).await?;

    let namespace = get_namespace(client, &name).await?;
    print!(
        "{}",
        format_labels(&format!("Labels for namespace {name}:"), namespace.labels())
    );

    let applied = BTreeMap::from([("my-enforce".to_string(), "restricted".to_string())]);
    apply_labels(client, &name, field_manager, &applied).await?;

    let namespace = get_namespace(client, &name).await?;
    print!(
        "{}",
        format_labels(&format!("Labels for namespace {name}:"), namespace.labels())
    );
    print!(
        "{}",
        format_labels(
            &format!("Labels from {name}"),
            &owned_labels(&namespace, field_manager)
        )
    );

    delete_namespace(client, &name).await
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{FieldsV1, ManagedFieldsEntry};

    use super::*;

    fn managed(manager: &str, operation: &str, fields: serde_json::Value) -> ManagedFieldsEntry {
        ManagedFieldsEntry {
            manager: Some(manager.to_string()),
            operation: Some(operation.to_string()),
            fields_type: Some("FieldsV1".to_string()),
            fields_v1: Some(FieldsV1(fields)),
            ..Default::default()
        }
    }

    #[test]
    fn scratch_namespace_name_uses_timestamp() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(test_namespace_name(now), "test-namespace-20240309-070501");
    }

    #[test]
    fn owned_labels_only_include_apply_entries_of_manager() {
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some("scratch".to_string()),
                labels: Some(BTreeMap::from([
                    ("foo".to_string(), "bar".to_string()),
                    ("my-enforce".to_string(), "restricted".to_string()),
                    (
                        "kubernetes.io/metadata.name".to_string(),
                        "scratch".to_string(),
                    ),
                ])),
                managed_fields: Some(vec![
                    managed(
                        "psa-sync-tools",
                        "Apply",
                        json!({"f:metadata": {"f:labels": {"f:my-enforce": {}}}}),
                    ),
                    managed(
                        "psa-sync-tools",
                        "Update",
                        json!({"f:metadata": {"f:labels": {"f:foo": {}}}}),
                    ),
                    managed(
                        "kubectl-create",
                        "Apply",
                        json!({"f:metadata": {"f:labels": {"f:kubernetes.io/metadata.name": {}}}}),
                    ),
                ]),
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(
            owned_labels(&namespace, "psa-sync-tools"),
            BTreeMap::from([("my-enforce".to_string(), "restricted".to_string())])
        );
        assert!(owned_labels(&namespace, "someone-else").is_empty());
    }

    #[test]
    fn labels_are_listed_in_key_order() {
        let labels = BTreeMap::from([
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "1".to_string()),
        ]);
        assert_eq!(
            format_labels("Labels for namespace x:", &labels),
            "---\nLabels for namespace x:\n- a: 1\n- b: 2\n"
        );
    }
}
