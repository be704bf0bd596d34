//! The idle sweeper background task (spec §4.4): periodically stops sessions
//! that have gone idle past the configured timeout.

use crate::state::AppState;
use std::time::Duration;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

pub fn spawn(state: AppState, sweep_seconds: u64) -> tokio::task::JoinHandle<()> {
    let interval = Duration::from_secs(sweep_seconds).max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            sweep_once(&state).await;
        }
    })
}

async fn sweep_once(state: &AppState) {
    let idle = state.sessions.get_idle_sessions();
    for session_id in idle {
        if let Err(e) = state.sessions.stop_session(&session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "idle sweep failed to stop session");
        } else {
            tracing::info!(session_id = %session_id, "idle sweep stopped session");
        }
    }
}
