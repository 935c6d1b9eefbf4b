//! Organization Operator - CRD-driven multi-tenancy for Kubernetes

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::Client;

use organization_operator::config::{ControllerArgs, ControllerConfig};
use organization_operator::controller::Context;
use organization_operator::controller_runner::build_controllers;
use organization_operator::retry::{retry_with_backoff, RetryConfig};
use organization_operator::telemetry::init_tracing;
use organization_operator::{crd, webhook};

/// Organization operator - maintains Organization and Space tenancy on Kubernetes
#[derive(Parser, Debug)]
#[command(
    name = "organization-operator",
    version,
    about,
    long_about = None,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    controller: ControllerArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Reconciles Organizations and Spaces and, when TLS material is
    /// configured, serves the admission webhook that adds the Space finalizer.
    Controller(ControllerArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider for the webhook's TLS listener and the kube client
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!("CRITICAL: Failed to install crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        print!("{}", crd::render_yaml()?);
        return Ok(());
    }

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        None => cli.controller,
    };
    let config = ControllerConfig::try_from(args)?;

    init_tracing(config.log_format)?;
    run_controller(config).await
}

async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    tracing::info!(
        concurrency = config.concurrency,
        reconcile_timeout_secs = config.reconcile_timeout.as_secs(),
        "Organization operator starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if config.install_crds {
        retry_with_backoff(&RetryConfig::with_max_attempts(10), "install_crds", || {
            crd::install(&client)
        })
        .await?;
    }

    let webhook_server = config.webhook_tls.clone().map(|tls| {
        let addr = config.webhook_addr;
        tokio::spawn(async move {
            if let Err(e) = webhook::serve(addr, &tls.cert, &tls.key).await {
                tracing::error!(error = %e, "Admission webhook stopped");
            }
        })
    });
    if webhook_server.is_none() {
        tracing::warn!("No webhook TLS material configured, Spaces will not get a finalizer");
    }

    let ctx = Arc::new(
        Context::builder(client.clone())
            .reconcile_timeout(config.reconcile_timeout)
            .backoff(config.backoff.clone())
            .build(),
    );

    tracing::info!("Starting controllers:");
    let controllers = build_controllers(client, ctx, config.concurrency);

    // Each controller stops on SIGTERM/SIGINT
    futures::future::join_all(controllers).await;

    if let Some(server) = webhook_server {
        server.abort();
    }

    tracing::info!("Organization operator shutting down");
    Ok(())
}
