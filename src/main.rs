//! psa-sync-tools: debugging utilities for the Pod Security admission label
//! synchronization controller.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use psa_sync_tools::audit::Auditor;
use psa_sync_tools::config::{client, load_config};
use psa_sync_tools::logs::{create_fixture, default_pattern, fixtures, search_pod_logs};
use psa_sync_tools::namespace::{apply_walkthrough, DEFAULT_FIELD_MANAGER};
use psa_sync_tools::render::{experiments, render_manifests, scc_variants, Templates};
use psa_sync_tools::violations::render_report;
use psa_sync_tools::warning::{LogWarnings, WarningHandler};

#[derive(Parser, Debug)]
#[command(name = "psa-sync-tools", version, about, long_about = None)]
struct Cli {
    /// Path to the kubeconfig file. Without it the configuration is inferred
    /// from KUBECONFIG, ~/.kube/config or the in-cluster environment.
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report the pods that would violate each namespace's audit level if it
    /// were enforced
    ///
    /// Every namespace is updated with dryRun=All, so nothing in the cluster
    /// changes. The report is printed to stdout as JSON, or nothing at all if
    /// no namespace has violations.
    Violations(ViolationsArgs),

    /// Create a scratch namespace, server-side apply a label to it, print the
    /// labels owned by the field manager and delete it again
    NamespaceApply(NamespaceApplyArgs),

    /// Search every pod's logs for the label synchronization controller
    ControllerLogs(ControllerLogsArgs),

    /// Render SCC and seccomp experiment manifests
    RenderScc(RenderSccArgs),
}

#[derive(Args, Debug)]
struct ViolationsArgs {
    /// Also log every server warning as it arrives
    #[arg(long)]
    log_warnings: bool,
}

#[derive(Args, Debug)]
struct NamespaceApplyArgs {
    /// Field manager used for the server-side apply
    #[arg(long, default_value = DEFAULT_FIELD_MANAGER)]
    field_manager: String,
}

#[derive(Args, Debug)]
struct ControllerLogsArgs {
    /// Pattern to search for in logs
    #[arg(long, default_value_t = default_pattern())]
    pattern: String,

    /// Create test namespaces and pods before searching
    #[arg(long)]
    create: bool,

    /// Skip the log search
    #[arg(long = "no-logs", action = clap::ArgAction::SetFalse)]
    logs: bool,

    /// Directory matching logs are saved to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Args, Debug)]
struct RenderSccArgs {
    /// Directory containing scc.yaml and experiment.yaml. The built-in
    /// templates are used when omitted.
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Output directory; removed and recreated on every run
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// User granted the SCC that allows any seccomp profile
    #[arg(long, default_value = "wildcard")]
    wildcard_user: String,

    /// User granted the SCC that allows the Unconfined seccomp profile
    #[arg(long, default_value = "unconfined")]
    unconfined_user: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    match cli.command {
        Commands::Violations(args) => run_violations(cli.kubeconfig, args).await,
        Commands::NamespaceApply(args) => run_namespace_apply(cli.kubeconfig, args).await,
        Commands::ControllerLogs(args) => {
            run_controller_logs(cli.kubeconfig, cli.debug, args).await
        }
        Commands::RenderScc(args) => run_render_scc(args),
    }
}

async fn run_violations(kubeconfig: Option<PathBuf>, args: ViolationsArgs) -> anyhow::Result<()> {
    let config = load_config(kubeconfig.as_deref()).await?;
    let inner: Option<Arc<dyn WarningHandler>> = if args.log_warnings {
        Some(Arc::new(LogWarnings))
    } else {
        None
    };
    let violations = Auditor::new(config, inner)?.run().await?;
    print!("{}", render_report(&violations));
    Ok(())
}

async fn run_namespace_apply(
    kubeconfig: Option<PathBuf>,
    args: NamespaceApplyArgs,
) -> anyhow::Result<()> {
    let client = client(load_config(kubeconfig.as_deref()).await?)?;
    apply_walkthrough(&client, &args.field_manager).await?;
    Ok(())
}

async fn run_controller_logs(
    kubeconfig: Option<PathBuf>,
    debug: bool,
    args: ControllerLogsArgs,
) -> anyhow::Result<()> {
    if debug {
        println!(
            "\nOptions:\n\tpattern: {}\n\tcreateResources: {}\n\tgetLogs: {}\n\tdebug: {}\n\tkubeconfig: {}\n",
            args.pattern,
            args.create,
            args.logs,
            debug,
            kubeconfig
                .as_deref()
                .map_or_else(|| "<inferred>".into(), |path| path.display().to_string()),
        );
    }

    let pattern = Regex::new(&args.pattern)
        .with_context(|| format!("invalid pattern {:?}", args.pattern))?;
    let client = client(load_config(kubeconfig.as_deref()).await?)?;

    if args.create {
        for (i, fixture) in fixtures().iter().enumerate() {
            create_fixture(&client, fixture).await.with_context(|| {
                format!("creating namespace and pod {}", i + 1)
            })?;
        }
    }

    if args.logs {
        search_pod_logs(&client, &pattern, &args.output_dir).await?;
        println!("Search completed.");
    }
    Ok(())
}

fn run_render_scc(args: RenderSccArgs) -> anyhow::Result<()> {
    let templates = match &args.template_dir {
        Some(dir) => Templates::load(dir)?,
        None => Templates::builtin(),
    };
    let written = render_manifests(
        &templates,
        &scc_variants(&args.wildcard_user, &args.unconfined_user),
        &experiments(),
        &args.out_dir,
    )?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
