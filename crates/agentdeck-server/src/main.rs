mod auth;
mod error;
mod handlers;
mod proxy;
mod router;
mod state;
mod sweeper;
mod types;
mod ws;

#[cfg(test)]
mod tests;

use agentdeck_container::{ContainerManager, DockerHost};
use agentdeck_core::logging::setup_logging;
use agentdeck_session::SessionManager;
use anyhow::Result;
use clap::Parser;
use state::AppState;
use std::path::PathBuf;
use std::sync::Arc;

/// AgentDeck control plane: launches, supervises, and proxies traffic to
/// isolated per-session worker containers.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to bind the control plane to.
    #[arg(long, env = "AGENTDECK_ADDR", default_value = "0.0.0.0:8088")]
    addr: String,

    /// Directory holding the registry and per-agent config documents.
    #[arg(long, env = "AGENTDECK_STATE_DIR", default_value = "./agentdeck-state")]
    state_dir: PathBuf,

    /// Worker image used to launch new agent containers.
    #[arg(long, env = "AGENTDECK_WORKER_IMAGE", default_value = "agentdeck-worker:latest")]
    image: String,

    /// Minutes of inactivity before a session is eligible for eviction. 0 disables the sweeper.
    #[arg(long, env = "AGENTDECK_SESSION_IDLE_MINUTES", default_value_t = 60)]
    idle_minutes: i64,

    /// Interval between idle sweeps, floored at 10 seconds.
    #[arg(long, env = "AGENTDECK_SESSION_SWEEP_SECONDS", default_value_t = 60)]
    sweep_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let args = Args::parse();

    tracing::info!(
        addr = %args.addr,
        state_dir = %args.state_dir.display(),
        image = %args.image,
        idle_minutes = args.idle_minutes,
        "starting agentdeck control plane"
    );

    let ambient_api_key = std::env::var("ANTHROPIC_API_KEY").ok();
    if ambient_api_key.is_none() {
        tracing::warn!("ANTHROPIC_API_KEY not set; launch/spawn calls must supply api_key explicitly");
    }

    let host = Arc::new(DockerHost::connect()?);
    let cm = Arc::new(ContainerManager::new(host, args.image.clone(), args.state_dir.clone()));
    let sessions = Arc::new(SessionManager::new(cm, args.state_dir.clone(), args.idle_minutes));
    let state = AppState::new(sessions, ambient_api_key)?;

    let sweeper_handle = if args.idle_minutes > 0 {
        Some(sweeper::spawn(state.clone(), args.sweep_seconds))
    } else {
        None
    };

    let app = router::build(state);
    let listener = tokio::net::TcpListener::bind(&args.addr).await?;
    tracing::info!(addr = %args.addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper_handle {
        handle.abort();
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
