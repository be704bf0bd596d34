//! `GET /ws/agents/{agent_id}/logs` (spec §4.3, §5, §9): one dedicated OS
//! thread per stream reads the container's blocking log iterator and hands
//! lines to the async event loop; a stop flag unblocks the thread on
//! disconnect.

use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

const CLOSE_UNKNOWN_AGENT: u16 = 1008;

pub async fn agent_logs(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let cm = state.sessions.container_manager();
    let Some(container_id) = cm.get_container_id(&agent_id) else {
        return ws.on_upgrade(move |socket| reject_unknown_agent(socket));
    };

    ws.on_upgrade(move |socket| stream_logs(socket, state, container_id))
}

async fn reject_unknown_agent(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_UNKNOWN_AGENT,
            reason: "unknown agent".into(),
        })))
        .await;
}

async fn stream_logs(socket: WebSocket, state: AppState, container_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let stop = Arc::new(AtomicBool::new(false));

    let host = state.sessions.container_manager().host();
    let rt = tokio::runtime::Handle::current();
    let reader_stop = stop.clone();
    tokio::task::spawn_blocking(move || {
        let lines = match host.logs(&container_id, rt) {
            Ok(lines) => lines,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open log stream");
                return;
            }
        };
        for line in lines {
            if reader_stop.load(Ordering::Relaxed) {
                break;
            }
            let Ok(raw) = line else { break };
            let trimmed = raw.trim_end();
            if trimmed.is_empty() {
                continue;
            }
            if tx.send(trimmed.to_string()).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            line = rx.recv() => {
                match line {
                    Some(line) => {
                        if sender.send(Message::Text(line.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
}
