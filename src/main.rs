// ABOUTME: Entry point for the skopia binary.
// ABOUTME: Loads settings, detects the own container, and runs one update cycle.

mod cli;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use skopia::config::Settings;
use skopia::engine::Engine;
use skopia::error::{Error, Result};
use skopia::runtime::{ContainerOps, DockerClient};
use skopia::types::ContainerId;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    settings.validate()?;

    let client = DockerClient::connect_local().map_err(Error::RuntimeConnection)?;
    let self_id = detect_self_id(&client).await;

    if let Some(id) = &self_id {
        tracing::debug!(id = %id.short(), "running containerized");
    } else {
        tracing::debug!("own container not detected, self-update disabled");
    }

    let json = cli.json;
    let engine = Engine::new(client, settings, self_id);

    // One cancellation token per cycle, fired by Ctrl-C.
    let cancel = CancellationToken::new();
    let signal_guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling the update cycle");
            signal_guard.cancel();
        }
    });

    let report = engine.run_cycle(&cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.summary());
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = match &cli.config {
        Some(path) => {
            if !path.is_file() {
                return Err(Error::ConfigNotFound(path.clone()));
            }
            Settings::load(path)?
        }
        None => {
            let cwd = std::env::current_dir()?;
            Settings::discover(&cwd)?
        }
    };
    Ok(cli.apply_to(settings))
}

/// Resolve the updater's own container ID.
///
/// `SKOPIA_CONTAINER_ID` wins when set; otherwise the hostname is tried,
/// since the runtime sets a container's hostname to its short ID. Detection
/// failure just disables the self-update and reaping paths.
async fn detect_self_id(client: &DockerClient) -> Option<ContainerId> {
    let hint = std::env::var("SKOPIA_CONTAINER_ID")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned());

    if hint.is_empty() {
        return None;
    }

    match client.get_container(&ContainerId::new(hint.clone())).await {
        Ok(container) => Some(container.id),
        Err(e) => {
            tracing::debug!(hint, error = %e, "could not resolve own container");
            None
        }
    }
}
