//! Renders the SecurityContextConstraints and seccomp experiment manifests
//! used to check how the synchronization controller treats seccomp settings.

use std::path::{Path, PathBuf};

use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;
use tracing::{event, Level};

use crate::error::{Error, Result};

pub const SCC_TEMPLATE: &str = "scc.yaml";
pub const EXPERIMENT_TEMPLATE: &str = "experiment.yaml";

const POD_SECCOMP_ANNOTATION: &str = "seccomp.security.alpha.kubernetes.io/pod: unconfined";
const CONTAINER_SECCOMP_ANNOTATION: &str =
    "container.seccomp.security.alpha.kubernetes.io/busybox: unconfined";

/// Values for `scc.yaml`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SccValues {
    pub users: Vec<String>,
    pub seccomp_profiles: Vec<String>,
}

/// Values for `experiment.yaml`. Empty fields are left out of the manifest.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExperimentValues {
    pub namespace: String,
    pub annotations: Vec<String>,
    pub pod_field: String,
    pub container_field: String,
}

/// One SCC allowing any seccomp profile for `wildcard_user`, one allowing
/// only `Unconfined` for `unconfined_user`.
pub fn scc_variants(wildcard_user: &str, unconfined_user: &str) -> Vec<SccValues> {
    vec![
        SccValues {
            users: vec![wildcard_user.to_string()],
            seccomp_profiles: vec![r#""*""#.to_string()],
        },
        SccValues {
            users: vec![unconfined_user.to_string()],
            seccomp_profiles: vec!["Unconfined".to_string()],
        },
    ]
}

fn experiment(
    namespace: &str,
    annotation: Option<&str>,
    pod_field: &str,
    container_field: &str,
) -> ExperimentValues {
    ExperimentValues {
        namespace: namespace.to_string(),
        annotations: annotation.into_iter().map(str::to_string).collect(),
        pod_field: pod_field.to_string(),
        container_field: container_field.to_string(),
    }
}

/// Every combination of seccomp annotation and field, at pod and container
/// level, including annotations that conflict with the field.
pub fn experiments() -> Vec<ExperimentValues> {
    let pod = Some(POD_SECCOMP_ANNOTATION);
    let container = Some(CONTAINER_SECCOMP_ANNOTATION);
    vec![
        experiment("wildcard-pod-no-annotations-no-fields", None, "", ""),
        experiment("unconfined-pod-no-annotations-no-fields", None, "", ""),
        experiment("wildcard-pod-annotations-no-fields", pod, "", ""),
        experiment("unconfined-pod-annotations-no-fields", pod, "", ""),
        experiment("wildcard-pod-no-annotations-fields", None, "Unconfined", ""),
        experiment("unconfined-pod-no-annotations-fields", None, "Unconfined", ""),
        experiment("wildcard-container-annotations-no-fields", container, "", ""),
        experiment("unconfined-container-annotations-no-fields", container, "", ""),
        experiment("wildcard-container-no-annotations-fields", None, "", "Unconfined"),
        experiment("unconfined-container-no-annotations-fields", None, "", "Unconfined"),
        experiment("unconfined-pod-annotations-fields-conflict", pod, "RuntimeDefault", ""),
        experiment(
            "unconfined-container-annotations-fields-conflict",
            container,
            "",
            "RuntimeDefault",
        ),
    ]
}

/// The template sources to render from.
#[derive(Clone, Debug)]
pub struct Templates {
    pub scc: String,
    pub experiment: String,
}

impl Templates {
    /// The templates shipped with this crate.
    pub fn builtin() -> Self {
        Self {
            scc: include_str!("../templates/scc.yaml").to_string(),
            experiment: include_str!("../templates/experiment.yaml").to_string(),
        }
    }

    /// Reads `scc.yaml` and `experiment.yaml` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(Error::io(path))
        };
        Ok(Self {
            scc: read(SCC_TEMPLATE)?,
            experiment: read(EXPERIMENT_TEMPLATE)?,
        })
    }
}

/// Strict template rendering: referencing an undefined value is an error.
pub struct ManifestRenderer {
    env: Environment<'static>,
}

impl Default for ManifestRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    pub fn render<S: Serialize>(&self, template: &str, values: &S) -> Result<String> {
        Ok(self.env.render_str(template, values)?)
    }
}

/// Clears `out_dir` and writes one `scc-<user>.yaml` per SCC variant and one
/// `<namespace>.yaml` per experiment into it. Returns the files written.
pub fn render_manifests(
    templates: &Templates,
    sccs: &[SccValues],
    experiments: &[ExperimentValues],
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    match std::fs::remove_dir_all(out_dir) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(Error::io(out_dir)(err)),
    }
    std::fs::create_dir_all(out_dir).map_err(Error::io(out_dir))?;

    let renderer = ManifestRenderer::new();
    let mut written = Vec::with_capacity(sccs.len() + experiments.len());
    let mut write = |file_name: String, contents: String| -> Result<()> {
        let path = out_dir.join(file_name);
        std::fs::write(&path, contents).map_err(Error::io(&path))?;
        written.push(path);
        Ok(())
    };

    for scc in sccs {
        let user = scc.users.first().map(String::as_str).unwrap_or("anonymous");
        write(format!("scc-{user}.yaml"), renderer.render(&templates.scc, scc)?)?;
    }
    for experiment in experiments {
        write(
            format!("{}.yaml", experiment.namespace),
            renderer.render(&templates.experiment, experiment)?,
        )?;
    }

    event!(
        Level::INFO,
        files = written.len(),
        out_dir = %out_dir.display(),
        "Rendered manifests."
    );
    Ok(written)
}
