//! Fixtures for exercising the label synchronization controller, and a
//! search of every pod's logs for its messages.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use futures::stream::{FuturesUnordered, StreamExt};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, SecurityContext};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, ListParams, LogParams, PostParams};
use kube::{Client, ResourceExt};
use kube_runtime::wait::{await_condition, conditions};
use regex::Regex;
use tracing::{event, Level};

use crate::audit::{AUDIT_LABEL, WARN_LABEL};
use crate::error::{Error, Result};
use crate::namespace::create_namespace;

pub const CONTROLLER_NAME: &str = "pod-security-admission-label-synchronization-controller";

/// Label that opts a namespace out of label synchronization.
pub const LABEL_SYNC_LABEL: &str = "security.openshift.io/scc.podSecurityLabelSync";

pub const TEST_POD_NAME: &str = "test-pod";

pub const POD_RUNNING_TIMEOUT: Duration = Duration::from_secs(60);

/// The pattern the controller's log lines carry.
pub fn default_pattern() -> String {
    format!("= {CONTROLLER_NAME} =")
}

/// A namespace, created with the given labels and field manager, holding one
/// pod that escalates privileges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fixture {
    pub namespace: &'static str,
    pub labels: BTreeMap<String, String>,
    pub field_manager: Option<&'static str>,
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Three namespaces the controller should treat differently: one whose
/// labels it set itself but that opted out of syncing, one it never syncs,
/// and one whose labels a user edited.
pub fn fixtures() -> Vec<Fixture> {
    vec![
        Fixture {
            namespace: "test-namespace-1",
            labels: labels(&[
                (WARN_LABEL, "restricted"),
                (AUDIT_LABEL, "restricted"),
                (LABEL_SYNC_LABEL, "false"),
            ]),
            field_manager: Some(CONTROLLER_NAME),
        },
        Fixture {
            namespace: "openshift-test-namespace-2",
            labels: BTreeMap::new(),
            field_manager: None,
        },
        Fixture {
            namespace: "test-namespace-3",
            labels: labels(&[(WARN_LABEL, "restricted"), (AUDIT_LABEL, "restricted")]),
            field_manager: Some("kubectl-edit"),
        },
    ]
}

pub fn test_pod(namespace: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(TEST_POD_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "test-container".to_string(),
                image: Some("busybox".to_string()),
                command: Some(vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    "echo 'Pod is running'; sleep infinity".to_string(),
                ]),
                security_context: Some(SecurityContext {
                    allow_privilege_escalation: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Creates the fixture's namespace and pod and waits for the pod to run.
pub async fn create_fixture(client: &Client, fixture: &Fixture) -> Result<()> {
    create_namespace(
        client,
        fixture.namespace,
        fixture.labels.clone(),
        fixture.field_manager,
    )
    .await?;

    let pods = Api::<Pod>::namespaced(client.clone(), fixture.namespace);
    pods.create(&PostParams::default(), &test_pod(fixture.namespace))
        .await
        .map_err(Error::kube("creating pod"))?;
    println!("Pod created successfully in namespace {}", fixture.namespace);

    wait_for_pod_running(client, fixture.namespace, TEST_POD_NAME, POD_RUNNING_TIMEOUT).await?;
    println!("Pod is now running in namespace {}", fixture.namespace);
    Ok(())
}

pub async fn wait_for_pod_running(
    client: &Client,
    namespace: &str,
    name: &str,
    timeout: Duration,
) -> Result<()> {
    let what = format!("pod {namespace}/{name} to be running");
    let pods = Api::<Pod>::namespaced(client.clone(), namespace);
    tokio::time::timeout(timeout, await_condition(pods, name, conditions::is_pod_running()))
        .await
        .map_err(|_| Error::Timeout {
            what: what.clone(),
            timeout,
        })?
        .map_err(|source| Error::Wait { what, source })?;
    Ok(())
}

/// `logs_<namespace>_<pod>_<YYYYMMDD_HHMMSS>.txt`
pub fn log_file_name(namespace: &str, pod: &str, now: DateTime<Local>) -> String {
    format!(
        "logs_{namespace}_{pod}_{}.txt",
        now.format("%Y%m%d_%H%M%S")
    )
}

/// What searching one pod's logs turned up.
#[derive(Debug)]
pub enum SearchOutcome {
    Saved { matches: usize, path: PathBuf },
    NoMatches,
    Failed(Error),
}

#[derive(Debug)]
pub struct PodSearch {
    pub namespace: String,
    pub pod: String,
    pub outcome: SearchOutcome,
}

impl PodSearch {
    /// The line printed for this pod.
    pub fn summary(&self) -> String {
        let (ns, pod) = (&self.namespace, &self.pod);
        match &self.outcome {
            SearchOutcome::Saved { matches, path } => format!(
                "Found {matches} matches in {ns}/{pod}. Logs saved to {}",
                path.display()
            ),
            SearchOutcome::NoMatches => format!("No matches found in {ns}/{pod}"),
            SearchOutcome::Failed(err) => format!("Error searching logs for {ns}/{pod}: {err}"),
        }
    }
}

/// Writes `logs` to `dir` when `pattern` matches them, returning the number
/// of matches and the file written.
pub async fn save_if_matching(
    pattern: &Regex,
    logs: &str,
    dir: &Path,
    file_name: &str,
) -> Result<Option<(usize, PathBuf)>> {
    let matches = pattern.find_iter(logs).count();
    if matches == 0 {
        return Ok(None);
    }
    let path = dir.join(file_name);
    tokio::fs::write(&path, logs)
        .await
        .map_err(Error::io(&path))?;
    Ok(Some((matches, path)))
}

async fn search_pod(client: &Client, pod: &Pod, pattern: &Regex, out_dir: &Path) -> PodSearch {
    let name = pod.name_any();
    let namespace = pod.namespace().unwrap_or_default();
    let outcome = match fetch_and_save(client, &namespace, &name, pattern, out_dir).await {
        Ok(Some((matches, path))) => SearchOutcome::Saved { matches, path },
        Ok(None) => SearchOutcome::NoMatches,
        Err(err) => SearchOutcome::Failed(err),
    };
    PodSearch {
        namespace,
        pod: name,
        outcome,
    }
}

async fn fetch_and_save(
    client: &Client,
    namespace: &str,
    name: &str,
    pattern: &Regex,
    out_dir: &Path,
) -> Result<Option<(usize, PathBuf)>> {
    if namespace.is_empty() {
        return Err(Error::MissingField {
            kind: "Pod",
            name: name.to_string(),
            field: "metadata.namespace",
        });
    }
    let logs = Api::<Pod>::namespaced(client.clone(), namespace)
        .logs(name, &LogParams::default())
        .await
        .map_err(Error::kube("reading pod logs"))?;
    let file_name = log_file_name(namespace, name, Local::now());
    save_if_matching(pattern, &logs, out_dir, &file_name).await
}

/// Reads the logs of every pod in the cluster concurrently and saves those
/// matching `pattern` under `out_dir`. Failures reading one pod are reported
/// in its [`PodSearch`] and do not stop the others.
pub async fn search_pod_logs(
    client: &Client,
    pattern: &Regex,
    out_dir: &Path,
) -> Result<Vec<PodSearch>> {
    let pods = Api::<Pod>::all(client.clone())
        .list(&ListParams::default())
        .await
        .map_err(Error::kube("listing pods"))?;
    event!(Level::INFO, pods = pods.items.len(), pattern = %pattern, "Searching pod logs.");

    let mut searches: FuturesUnordered<_> = pods
        .items
        .iter()
        .map(|pod| search_pod(client, pod, pattern, out_dir))
        .collect();

    let mut results = Vec::with_capacity(pods.items.len());
    while let Some(search) = searches.next().await {
        println!("{}", search.summary());
        results.push(search);
    }
    Ok(results)
}
