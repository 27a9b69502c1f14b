//! LoadTest Operator - runs LoadTest resources as parallel worker Jobs

mod controller_runner;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};
use tokio_util::sync::CancellationToken;

use loadtest_common::crd::LoadTest;
use loadtest_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use loadtest_common::FIELD_MANAGER;
use loadtest_job::defaults::DEFAULT_WORKER_IMAGE;
use loadtest_job::labels::{DEFAULT_LABEL_PREFIX, DEFAULT_PART_OF};
use loadtest_job::{LabelScheme, LoadTestContext, WorkerDefaults, WorkerTelemetry};

/// LoadTest operator - turns LoadTest resources into indexed worker Jobs
#[derive(Parser, Debug)]
#[command(name = "loadtest-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Log output format (json or pretty)
    #[arg(long, env = "LOADTEST_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches LoadTest resources in all namespaces and creates one worker
    /// Job per LoadTest.
    Controller(ControllerArgs),
}

/// Controller settings
#[derive(Parser, Debug, Clone, PartialEq)]
struct ControllerArgs {
    /// Worker image used when a LoadTest does not set one
    #[arg(long, env = "LOADTEST_WORKER_IMAGE", default_value = DEFAULT_WORKER_IMAGE)]
    worker_image: String,

    /// Prefix of the label keys put on worker Jobs and pods
    #[arg(long, default_value = DEFAULT_LABEL_PREFIX)]
    label_prefix: String,

    /// Turn off telemetry in worker processes
    #[arg(long, env = "ARTILLERY_DISABLE_TELEMETRY")]
    disable_worker_telemetry: bool,

    /// Enable telemetry debug output in worker processes
    #[arg(long, env = "ARTILLERY_TELEMETRY_DEBUG")]
    worker_telemetry_debug: bool,

    /// Do not install or update the LoadTest CRD on startup
    #[arg(long)]
    skip_crd_install: bool,
}

impl ControllerArgs {
    fn worker_defaults(&self) -> WorkerDefaults {
        WorkerDefaults::default()
            .with_image(self.worker_image.clone())
            .with_labels(LabelScheme::new(self.label_prefix.clone(), DEFAULT_PART_OF))
    }

    fn worker_telemetry(&self) -> WorkerTelemetry {
        WorkerTelemetry {
            disabled: self.disable_worker_telemetry,
            debug: self.worker_telemetry_debug,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider before any TLS client is built
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install aws-lc-rs crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&LoadTest::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        log_format: cli.log_format,
        ..Default::default()
    })?;

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        None => ControllerArgs::parse_from(["controller"]),
    };

    run_controller(args).await
}

/// Ensure the LoadTest CRD is installed
///
/// Server-side apply keeps the installed CRD in step with the operator version.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing LoadTest CRD...");
    crds.patch(
        "loadtests.loadtest.artillery.io",
        &params,
        &Patch::Apply(&LoadTest::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install LoadTest CRD: {}", e))?;

    Ok(())
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    tracing::info!(
        worker_image = %args.worker_image,
        label_prefix = %args.label_prefix,
        "LoadTest controller starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if args.skip_crd_install {
        tracing::info!("Skipping CRD installation");
    } else {
        ensure_crd_installed(&client).await?;
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let ctx = Arc::new(LoadTestContext::new(
        client.clone(),
        args.worker_defaults(),
        args.worker_telemetry(),
        cancel,
    ));

    controller_runner::run_load_test_controller(client, ctx).await;

    tracing::info!("LoadTest controller stopped");
    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM so in-flight cluster calls abort
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to register ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = term => {}
    }

    tracing::info!("Shutdown signal received, cancelling reconciliations");
    token.cancel();
}
