//! # vista
//!
//! Serves a test run to dashboard observers over the vista API. With
//! `--state`, a recorded run is loaded and served as is; without it, the
//! server starts empty.

#![deny(unsafe_code)]

mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use vista_core::Engine;
use vista_core::memory::{MemoryEngine, StaticProject};
use vista_settings::{VistaSettings, load_settings_from_path, settings_path};
use vista_server::metrics::install_recorder;
use vista_server::{ServerConfig, VistaServer};

/// Vista API server.
#[derive(Parser, Debug)]
#[command(name = "vista", about = "Serve test-run state to dashboard observers")]
struct Cli {
    /// Recorded run to serve (JSON with `files`, `unhandledErrors`, `config`,
    /// `specifications`).
    #[arg(long)]
    state: Option<PathBuf>,

    /// Project root test files are resolved against (defaults to the current
    /// directory).
    #[arg(long)]
    root: Option<PathBuf>,

    /// Settings file (defaults to `~/.vista/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path observers connect to (overrides settings).
    #[arg(long)]
    api_path: Option<String>,
}

impl Cli {
    /// Command-line flags win over the settings file and environment.
    fn apply(&self, settings: &mut VistaSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(api_path) = &self.api_path {
            settings.server.api_path.clone_from(api_path);
        }
    }

    fn root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("Failed to resolve current directory"),
        }
    }
}

/// Build the engine, from a recorded run when one is given.
fn load_engine(state: Option<&Path>, root: &Path) -> Result<MemoryEngine> {
    let root = root.to_string_lossy().into_owned();
    let Some(path) = state else {
        return Ok(MemoryEngine::new(Arc::new(StaticProject::new("", root))));
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run state: {}", path.display()))?;
    let snapshot = MemoryEngine::load_snapshot(&raw)
        .with_context(|| format!("Invalid run state: {}", path.display()))?;
    Ok(MemoryEngine::from_snapshot(snapshot, root))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings: {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    telemetry::init_tracing(&settings.logging);
    let metrics = install_recorder().context("Failed to install metrics recorder")?;

    let engine = Arc::new(load_engine(cli.state.as_deref(), &cli.root()?)?);
    let file_count = engine.paths().len();

    let server = VistaServer::new(
        ServerConfig::from_settings(&settings.server),
        engine,
        Some(metrics),
    );
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        files = file_count,
        "vista listening on ws://{addr}{}",
        server.config().api_path
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    if server.shutdown().graceful_shutdown(handle, None).await {
        tracing::info!("shutdown complete");
    }
    Ok(())
}
