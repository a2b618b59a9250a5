//! Platform Runtime
//!
//! Connects the SIP adapter to the per-call supervisors: the access decision
//! before media, supervisor spawning on confirmed calls, and the SIP event
//! fan-out to the dashboard.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::access::AccessStore;
use crate::call::{CallLogBuffer, CallSupervisor, DashboardEvent, SupervisorCommand, SupervisorDeps};
use crate::server::{ActiveCallHandle, AppState};
use crate::sip::{CallDecision, SipEvent};

/// Capacity of the dashboard->supervisor command channel
const COMMAND_QUEUE: usize = 16;

/// Build the inbound-call decider: blacklist rejects with 403 before any
/// media resources exist; everything else is taken (the gate does the rest).
pub fn make_decider(state: &AppState) -> crate::sip::IncomingDecider {
    let access = state.access.clone();
    let events = state.events.clone();

    Arc::new(move |caller_id: String| {
        let access = access.clone();
        let events = events.clone();
        Box::pin(async move {
            match access.blacklist_entry(&caller_id).await {
                Ok(Some(entry)) => {
                    let kind = if entry.reason.starts_with("auto") {
                        "auto"
                    } else {
                        "manual"
                    };
                    let reason = format!("blacklist:{}", kind);
                    tracing::warn!("rejecting blacklisted caller {} ({})", caller_id, reason);
                    let _ = events.send(DashboardEvent::CallRejected { caller_id, reason });
                    CallDecision::Reject(403)
                }
                Ok(None) => CallDecision::Accept,
                Err(e) => {
                    // The gate still protects the call; do not fail closed on
                    // a storage hiccup
                    tracing::error!("blacklist lookup failed: {}", e);
                    CallDecision::Accept
                }
            }
        })
    })
}

/// Drive SIP events for the lifetime of the process
pub async fn sip_event_loop(
    state: AppState,
    access: Arc<AccessStore>,
    call_log: CallLogBuffer,
    mut sip_events: mpsc::Receiver<SipEvent>,
) {
    while let Some(event) = sip_events.recv().await {
        match event {
            SipEvent::RegistrationChanged(reg_state) => {
                tracing::info!("SIP registration state: {:?}", reg_state);
                let status = state.status_event().await;
                let _ = state.events.send(status);
            }
            SipEvent::IncomingCall { caller_id } => {
                let _ = state.events.send(DashboardEvent::CallIncoming {
                    caller_id: caller_id.clone(),
                });
            }
            SipEvent::CallRejected { caller_id, code } => {
                // The blacklist path publishes its own, richer event
                tracing::info!("call from {} rejected with {}", caller_id, code);
            }
            SipEvent::CallActive { caller_id, media } => {
                let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);

                {
                    let mut active = state.active_call.write().await;
                    if active.is_some() {
                        tracing::error!("call already active, dropping second media session");
                        continue;
                    }
                    *active = Some(ActiveCallHandle {
                        caller_id: caller_id.clone(),
                        agent: crate::agents::SECURITY_AGENT_NAME.to_string(),
                        commands: command_tx,
                    });
                }

                let deps = SupervisorDeps {
                    config: state.config.clone(),
                    pool: state.pool.clone(),
                    access: access.clone(),
                    registry: state.registry.clone(),
                    events: state.events.clone(),
                    sip: state.sip.clone(),
                    call_log: call_log.clone(),
                    default_model: state.default_model.clone(),
                };

                let state_for_cleanup = state.clone();
                tokio::spawn(async move {
                    CallSupervisor::run(deps, caller_id, media, command_rx).await;
                    *state_for_cleanup.active_call.write().await = None;
                    let status = state_for_cleanup.status_event().await;
                    let _ = state_for_cleanup.events.send(status);
                });
            }
            SipEvent::CallEnded { reason } => {
                let active = state.active_call.read().await;
                if let Some(handle) = active.as_ref() {
                    let _ = handle
                        .commands
                        .send(SupervisorCommand::SipEnded(reason))
                        .await;
                }
            }
        }
    }
    tracing::info!("SIP event loop ended");
}
