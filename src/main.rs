use anyhow::Context;
use clap::Parser;
use mc_runner::artifact::HttpArtifactProvider;
use mc_runner::config::{LoggingConfig, validate_config};
use mc_runner::server::LogNotifier;
use mc_runner::{Config, FleetManager};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Supervise a fleet of Minecraft servers on this host.
#[derive(Parser, Debug)]
#[command(name = "mc-runner", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    validate_config(&config).context("validating configuration")?;

    let _log_guard = setup_logging(&config.logging)?;
    tracing::info!(config = %args.config.display(), "Starting mc-runner");

    let provider = Arc::new(HttpArtifactProvider::new(config.artifacts.clone()));
    let manager = FleetManager::open(config, provider, Arc::new(LogNotifier))
        .await
        .context("opening fleet")?;

    for (name, result) in manager.reconcile_on_boot().await {
        match result {
            Ok(()) => tracing::info!(server_name = %name, "Server resumed"),
            Err(e) => tracing::warn!(server_name = %name, error = %e, "Server not resumed"),
        }
    }

    wait_for_shutdown_signal().await?;
    tracing::info!("Shutdown requested");

    manager.shutdown().await;
    tracing::info!("mc-runner stopped");
    Ok(())
}

/// Console output plus an optional plain-text log file.
///
/// `RUST_LOG` takes precedence over the configured level.
fn setup_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("invalid log level")?;

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .context("logging.file must name a file")?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    Ok(guard)
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("waiting for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")
}
