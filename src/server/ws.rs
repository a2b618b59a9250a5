//! Dashboard WebSocket Hub
//!
//! Fan-out of call events to every connected dashboard plus the command
//! channel back to the active supervisor. Broadcast is best effort: a client
//! that cannot keep up is dropped, never back-pressures the call.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::agents::SECURITY_AGENT_NAME;
use crate::call::{DashboardEvent, SupervisorCommand};

use super::AppState;

/// Client -> server commands
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardCommand {
    Hangup,
    MuteAi,
    UnmuteAi,
    SwitchAgent { agent_name: String },
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();

    // Initial status snapshot so a fresh dashboard renders immediately
    let status = state.status_event().await;
    if let Ok(json) = serde_json::to_string(&status) {
        if sender.send(Message::Text(json.into())).await.is_err() {
            return;
        }
    }

    tracing::info!("dashboard client connected");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Slow consumer: it already lost events, cut it loose
                        tracing::warn!("dashboard client lagged {} events, dropping", missed);
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<DashboardCommand>(&text) {
                            Ok(command) => dispatch_command(&state, command).await,
                            Err(e) => tracing::debug!("unparseable dashboard command: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!("dashboard socket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!("dashboard client disconnected");
}

/// Route one command to the active supervisor
pub async fn dispatch_command(state: &AppState, command: DashboardCommand) {
    let supervisor_command = match command {
        DashboardCommand::Hangup => SupervisorCommand::Hangup,
        DashboardCommand::MuteAi => SupervisorCommand::MuteAi,
        DashboardCommand::UnmuteAi => SupervisorCommand::UnmuteAi,
        DashboardCommand::SwitchAgent { agent_name } => {
            // Nothing routes to the gate, the dashboard included
            if agent_name == SECURITY_AGENT_NAME {
                tracing::warn!("dashboard switch to the security gate refused");
                return;
            }
            SupervisorCommand::SwitchAgent(agent_name)
        }
    };

    let active = state.active_call.read().await;
    match active.as_ref() {
        Some(handle) => {
            if handle.commands.send(supervisor_command).await.is_err() {
                tracing::warn!("active call is gone, command dropped");
            }
        }
        None => tracing::debug!("no active call for dashboard command"),
    }
}

/// Publish an event to all dashboards (helper for non-call paths)
pub fn publish(events: &broadcast::Sender<DashboardEvent>, event: DashboardEvent) {
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        let cmd: DashboardCommand = serde_json::from_str(r#"{"type": "hangup"}"#).unwrap();
        assert!(matches!(cmd, DashboardCommand::Hangup));

        let cmd: DashboardCommand =
            serde_json::from_str(r#"{"type": "switch_agent", "agent_name": "main_agent"}"#)
                .unwrap();
        match cmd {
            DashboardCommand::SwitchAgent { agent_name } => assert_eq!(agent_name, "main_agent"),
            other => panic!("unexpected: {:?}", other),
        }

        assert!(serde_json::from_str::<DashboardCommand>(r#"{"type": "reboot"}"#).is_err());
    }
}
