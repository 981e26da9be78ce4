use anyhow::Context;
use clap::{Parser, Subcommand};
use monitor_gateway::config::{Config, DEFAULT_CONFIG_PATH};
use monitor_gateway::metrics::{self, spawn_sweepers};
use monitor_gateway::reload::{run_reload_loop, ConfigWatcher, Reloader};
use monitor_gateway::server::{start_server, AppState};
use monitor_gateway::{logging, pipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "monitor_gateway")]
#[command(about = "Encrypted telemetry ingestion gateway")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway (default)
    Serve {
        /// Path to the TOML config file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Encrypt a JSON payload the way agents do and POST it
    Push {
        /// Ingest endpoint, e.g. http://127.0.0.1:8080/metrics_data
        #[arg(long)]
        url: String,
        /// Shared AES key (16, 24 or 32 bytes)
        #[arg(long)]
        key: String,
        /// JSON file with `project`, `source` and `data`
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve {
        config: PathBuf::from(DEFAULT_CONFIG_PATH),
    }) {
        Commands::Serve { config } => serve(config).await,
        Commands::Push { url, key, file } => push(&url, &key, &file).await,
    }
}

async fn serve(config_path: PathBuf) -> anyhow::Result<()> {
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let addr = config.listen_addr()?;

    metrics::init_metrics();

    let state = AppState::from_config(&config).context("initializing gateway state")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut tasks = spawn_sweepers(&state.groups, config.sweep_interval(), shutdown_rx.clone());
    tasks.push(tokio::spawn(state.allowlist.clone().run_refresher(
        config.dns_refresh_interval(),
        shutdown_rx.clone(),
    )));

    let reloader = Arc::new(Reloader::new(
        config_path.clone(),
        config.clone(),
        state.key.clone(),
        state.allowlist.clone(),
        state.directory.clone(),
    ));
    match ConfigWatcher::new(&config_path, &config.projects_file) {
        Ok(watcher) => tasks.push(tokio::spawn(run_reload_loop(
            watcher,
            reloader,
            shutdown_rx.clone(),
        ))),
        Err(e) => warn!(error = %e, "config watcher unavailable, hot reload disabled"),
    }

    info!(
        ttl = ?config.ttl(),
        sweep = ?config.sweep_interval(),
        workers = config.dispatch.workers,
        "Gateway starting"
    );

    let dispatcher = state.dispatcher.clone();
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(start_server(state, addr, async move {
        let _ = server_shutdown.changed().await;
    }));

    shutdown_signal().await;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    match server.await {
        Ok(Err(e)) => error!(error = %e, "HTTP server failed"),
        Err(e) => error!(error = %e, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    dispatcher.shutdown().await;
    for task in tasks {
        let _ = task.await;
    }
    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn push(url: &str, key: &str, file: &Path) -> anyhow::Result<()> {
    let payload = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    // Validate locally so a typo does not show up as a generic 400
    serde_json::from_slice::<serde_json::Value>(&payload)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let body = pipeline::seal(key, &payload)?;
    info!(bytes = body.len(), url, "Pushing payload");

    let response = reqwest::Client::new()
        .post(url)
        .header("Content-Type", "application/octet-stream")
        .body(body)
        .send()
        .await?;
    let status = response.status();
    let text = response.text().await?;
    println!("{status} {text}");
    if !status.is_success() {
        anyhow::bail!("gateway rejected payload with {status}");
    }
    Ok(())
}
