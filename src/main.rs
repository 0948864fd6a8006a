mod app;
mod cli;
mod config;
mod error;
mod fuzzy;
mod input;
mod k8s;
mod model;
mod orchestrator;
mod selector;
mod session;
mod ui;

use anyhow::{Context, Result};
use app::PickerHeader;
use clap::Parser;
use cli::CliArgs;
use config::Settings;
use error::RunError;
use k8s::KubeGateway;
use selector::TerminalSelector;
use session::LocalTerminal;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("podsh: {}: {error}", error.stage());
            error.exit_code()
        }
    };

    // The stdin reader thread can keep the runtime alive past the session.
    std::process::exit(code);
}

async fn run() -> Result<(), RunError> {
    let args = CliArgs::parse();
    let settings = Settings::load(&args).map_err(RunError::Config)?;
    init_tracing(&settings.log_filter, settings.log_file.as_deref()).map_err(RunError::Config)?;
    if let Some(source) = &settings.source {
        debug!("loaded config from {source}");
    }

    let gateway = KubeGateway::connect(&settings.connect)
        .await
        .map_err(RunError::Config)?;
    info!(
        "connected to {} (context {})",
        gateway.cluster(),
        gateway.context()
    );

    // captured_at is stamped from the pod snapshot when the picker opens.
    let mut selector = TerminalSelector::new().with_header(PickerHeader {
        cluster: gateway.cluster().to_string(),
        context: gateway.context().to_string(),
        captured_at: String::new(),
    });

    let report = orchestrator::run(
        &gateway,
        &mut selector,
        &gateway,
        &settings.run,
        LocalTerminal::stdio(),
    )
    .await?;
    info!("session with {} closed", report.target.qualified_name());
    Ok(())
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    let _ = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::sink).try_init(),
    };

    Ok(())
}
