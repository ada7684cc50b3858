//! lifeplanned: the lifeplan daemon.
//!
//! Single authority over the planner database; the `lifeplan` CLI finds it via
//! the PID file and talks to it over HTTP. See [`lifeplan::server`] for the
//! routes.
//!
//! Build and run: `cargo run --bin lifeplanned`

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::{IntoDiagnostic, Result};

use lifeplan::config::PlannerConfig;
use lifeplan::paths::LifeplanPaths;
use lifeplan::planner::Planner;

#[derive(Parser)]
#[command(name = "lifeplanned", version, about = "lifeplan HTTP daemon")]
struct Args {
    /// Root directory for config, data and state (default: XDG directories).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory.
    #[arg(long)]
    memory: bool,

    /// Bind address (overrides config and LIFEPLAN_BIND).
    #[arg(long)]
    bind: Option<String>,

    /// Port (overrides config and LIFEPLAN_PORT).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let paths = match &args.data_dir {
        Some(root) => LifeplanPaths::rooted(root),
        None => LifeplanPaths::resolve()?,
    };
    paths.ensure_dirs()?;

    let mut config = PlannerConfig::load_or_default(&paths.config_file())?;
    config.apply_env()?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let addr = format!("{bind}:{port}");

    let planner = if args.memory {
        Planner::in_memory(config)?
    } else {
        Planner::open(config, &paths.db_dir())?
    };
    let planner = Arc::new(planner);

    tracing::info!(persistent = !args.memory, "lifeplanned initialized");

    // Let `lifeplan` discover this server.
    if let Err(e) = lifeplan::client::write_pid_file(&paths, port, &bind) {
        tracing::warn!("failed to write PID file: {e}");
    }

    let paths_for_shutdown = paths.clone();
    let shutdown = async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {},
                        _ = sigterm.recv() => {},
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
        tracing::info!("lifeplanned shutting down");
        lifeplan::client::remove_pid_file(&paths_for_shutdown);
    };

    let served = lifeplan::server::serve(planner, &addr, shutdown)
        .await
        .into_diagnostic();

    lifeplan::client::remove_pid_file(&paths);
    served
}
