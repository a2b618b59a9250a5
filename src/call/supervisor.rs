//! Call Supervisor
//!
//! Wires one accepted call end to end: SIP media through the resampler into
//! the AI session and back, AI events through the agent manager, and every
//! observable state change onto the dashboard stream. Owns all per-call
//! tasks and tears them down deterministically.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::access::AccessStore;
use crate::agents::{
    AgentManager, AgentRegistry, HangupCause, ToolOutcome, MAIN_AGENT_NAME, SECURITY_AGENT_NAME,
};
use crate::ai::{CostTracker, ModelChoice, RealtimeEvent, RealtimeSession, SessionConfig};
use crate::audio::{
    beep, samples_to_pcm16, Frame, FrameQueue, Reframer, Resampler, SampleRate,
};
use crate::call::{AiStateKind, CallLogBuffer, DashboardEvent};
use crate::config::AppConfig;
use crate::db;
use crate::models::TranscriptLine;
use crate::sip::{MediaChannels, SipUserAgent};

/// Hangup after this much caller silence in the security gate
const GATE_TIMEOUT: Duration = Duration::from_secs(15);

/// SIP->AI queue: 50 x 20ms = 1s of backlog before frames drop
const RX16_QUEUE_FRAMES: usize = 50;

/// Delay before the manual greeting, so the session settles first
const GREETING_DELAY: Duration = Duration::from_millis(200);

/// How long teardown waits for the per-call tasks
const JOIN_DEADLINE: Duration = Duration::from_secs(2);

/// Reconnect schedule for a dropped AI websocket
const AI_RECONNECT_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Commands routed to the supervisor of the active call
#[derive(Debug, Clone)]
pub enum SupervisorCommand {
    Hangup,
    MuteAi,
    UnmuteAi,
    SwitchAgent(String),
    /// The SIP leg ended (remote BYE or local hangup completion)
    SipEnded(String),
}

/// Process-wide collaborators a supervisor is built from
#[derive(Clone)]
pub struct SupervisorDeps {
    pub config: Arc<AppConfig>,
    pub pool: SqlitePool,
    pub access: Arc<AccessStore>,
    pub registry: Arc<AgentRegistry>,
    pub events: broadcast::Sender<DashboardEvent>,
    pub sip: Arc<SipUserAgent>,
    pub call_log: CallLogBuffer,
    /// Operator-chosen tier used when a call starts (defaults to mini)
    pub default_model: Arc<std::sync::RwLock<ModelChoice>>,
}

/// Supervisor of one call, 1:1 with an accepted INVITE
pub struct CallSupervisor {
    deps: SupervisorDeps,
    call_id: String,
    caller_id: String,
    started_at: chrono::DateTime<chrono::Utc>,

    manager: AgentManager,
    session: Arc<RealtimeSession>,
    cost: CostTracker,
    /// The caller's explicit model choice; agents with a preferred model
    /// override it only while they are active
    user_model: ModelChoice,
    current_model: ModelChoice,

    tx_queue: Arc<FrameQueue>,
    tx_resampler: Resampler,
    tx_reframer: Reframer,

    ai_state: AiStateKind,
    transcript: Vec<TranscriptLine>,
    assistant_line: String,
    gate_deadline: Option<Instant>,
    end_reason: Option<String>,

    cancel: CancellationToken,
    ai_events: mpsc::UnboundedReceiver<RealtimeEvent>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl CallSupervisor {
    /// Run the whole call; returns when the call is finalised.
    pub async fn run(
        deps: SupervisorDeps,
        caller_id: String,
        media: MediaChannels,
        mut commands: mpsc::Receiver<SupervisorCommand>,
    ) {
        let call_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();

        deps.call_log.attach();
        tracing::info!("call {} from {} supervised", call_id, caller_id);

        if let Err(e) = db::calls::create(&deps.pool, &call_id, &caller_id, started_at).await {
            tracing::error!("could not persist call record: {}", e);
        }

        let (ai_event_tx, ai_events) = mpsc::unbounded_channel();
        let session = Arc::new(RealtimeSession::new(
            deps.config.ai.api_key.clone(),
            ai_event_tx,
        ));

        let manager = AgentManager::new(deps.registry.clone());
        let initial_model = *deps.default_model.read().expect("model lock poisoned");
        let cost = CostTracker::new(deps.config.ai.prices, initial_model);

        let mut supervisor = CallSupervisor {
            deps,
            call_id,
            caller_id,
            started_at,
            manager,
            session,
            cost,
            user_model: initial_model,
            current_model: initial_model,
            tx_queue: media.tx.clone(),
            tx_resampler: Resampler::new(SampleRate::Hz24000, SampleRate::Hz48000),
            tx_reframer: Reframer::new(SampleRate::Hz48000),
            ai_state: AiStateKind::Idle,
            transcript: Vec::new(),
            assistant_line: String::new(),
            gate_deadline: None,
            end_reason: None,
            cancel: CancellationToken::new(),
            ai_events,
            tasks: Vec::new(),
        };

        supervisor.run_call(media, &mut commands).await;
        supervisor.finalize().await;
    }

    async fn run_call(
        &mut self,
        media: MediaChannels,
        commands: &mut mpsc::Receiver<SupervisorCommand>,
    ) {
        // Gate vs whitelist decision happened for blacklist already (reject
        // path); here we pick the initial agent.
        let whitelisted = match self.deps.access.is_whitelisted(&self.caller_id).await {
            Ok(w) => w,
            Err(e) => {
                tracing::error!("whitelist lookup failed: {}", e);
                false
            }
        };

        if let Err(e) = self
            .manager
            .start_call(&self.caller_id, SECURITY_AGENT_NAME)
            .await
        {
            tracing::error!("no gate agent registered: {}", e);
            self.end_reason = Some("internal_error".to_string());
            return;
        }

        if whitelisted {
            tracing::info!("caller {} whitelisted, skipping gate", self.caller_id);
            let _ = self.manager.switch_agent(MAIN_AGENT_NAME).await;
            self.manager.set_unlocked(true);
        } else {
            self.gate_deadline = Some(Instant::now() + GATE_TIMEOUT);
        }

        // AI session against the default (mini) model
        self.session
            .configure(SessionConfig {
                tools: self.manager.tools().await,
                instructions: self.manager.instructions().await,
                voice: self.deps.config.ai.voice.clone(),
            })
            .await;

        let model_id = self.deps.config.ai.model_id(self.current_model).to_string();
        if let Err(e) = self.session.connect(&model_id).await {
            tracing::error!("AI session connect failed: {}", e);
            self.end_reason = Some("ai_connect_failed".to_string());
            let _ = self.deps.sip.hangup().await;
            return;
        }
        self.ai_state = AiStateKind::Listening;

        self.spawn_uplink(media.rx);

        let agent_name = self
            .manager
            .active_name()
            .await
            .unwrap_or_else(|| "none".to_string());
        self.publish(DashboardEvent::CallActive {
            caller_id: self.caller_id.clone(),
            agent: agent_name,
        });
        self.publish(DashboardEvent::AiState {
            state: self.ai_state,
        });

        self.maybe_greet().await;

        // Supervisor loop: downlink events, dashboard commands, gate timer
        loop {
            let gate_deadline = self.gate_deadline;
            let gate_timer = async move {
                match gate_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = self.ai_events.recv() => {
                    match event {
                        Some(event) => {
                            if self.handle_ai_event(event).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = gate_timer => {
                    if self.handle_gate_timeout().await {
                        break;
                    }
                }
            }
        }
    }

    /// SIP RX -> 16kHz -> AI, via the bounded drop-oldest queue
    fn spawn_uplink(&mut self, sip_rx: Arc<FrameQueue>) {
        let rx16 = Arc::new(FrameQueue::new("ai-rx", RX16_QUEUE_FRAMES));

        let queue = rx16.clone();
        let cancel = self.cancel.clone();
        let pump = tokio::spawn(async move {
            let mut to_ai = Resampler::new(SampleRate::Hz48000, SampleRate::Hz16000);
            let mut reframer = Reframer::new(SampleRate::Hz16000);
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = sip_rx.recv() => frame,
                };
                let resampled = to_ai.process(&frame.samples).to_vec();
                for frame in reframer.push(&resampled) {
                    queue.push(frame);
                }
            }
        });

        let session = self.session.clone();
        let cancel = self.cancel.clone();
        let uplink = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = rx16.recv() => frame,
                };
                if !session.is_connected() {
                    continue;
                }
                if let Err(e) = session.send_audio(&samples_to_pcm16(&frame.samples)).await {
                    tracing::debug!("uplink send failed: {}", e);
                }
            }
        });

        self.tasks.push(pump);
        self.tasks.push(uplink);
    }

    /// Manual greeting when the agent has one, is not the gate, and nothing
    /// is already in flight (server VAD drives it otherwise)
    async fn maybe_greet(&self) {
        let Some(agent) = self.manager.active().await else {
            return;
        };
        if agent.name == SECURITY_AGENT_NAME || agent.greeting.is_none() {
            return;
        }
        if self.session.response_in_progress() {
            return;
        }

        let session = self.session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(GREETING_DELAY).await;
            if let Err(e) = session.trigger_response().await {
                tracing::warn!("greeting trigger failed: {}", e);
            }
        });
    }

    /// Handle one AI event; returns true when the call should end
    async fn handle_ai_event(&mut self, event: RealtimeEvent) -> bool {
        match event {
            RealtimeEvent::Audio(pcm24k) => {
                let samples = crate::audio::pcm16_to_samples(&pcm24k);
                let bridged = self.tx_resampler.process(&samples).to_vec();
                for frame in self.tx_reframer.push(&bridged) {
                    self.tx_queue.push(frame);
                }
                if self.ai_state != AiStateKind::Speaking {
                    self.set_ai_state(AiStateKind::Speaking);
                }
                false
            }
            RealtimeEvent::Transcript {
                role,
                text,
                is_final,
            } => {
                if is_final {
                    self.transcript.push(TranscriptLine {
                        role: role.to_string(),
                        text: text.clone(),
                    });
                    if role == "user" && self.gate_deadline.is_some() {
                        // Caller spoke: restart the inactivity window
                        self.gate_deadline = Some(Instant::now() + GATE_TIMEOUT);
                    }
                    if role == "assistant" {
                        self.assistant_line.clear();
                    }
                } else if role == "assistant" {
                    self.assistant_line.push_str(&text);
                }

                self.publish(DashboardEvent::Transcript {
                    role: role.to_string(),
                    text,
                    is_final,
                });
                false
            }
            RealtimeEvent::ResponseStarted => {
                self.set_ai_state(AiStateKind::Thinking);
                false
            }
            RealtimeEvent::ResponseDone { usage } => {
                if let Some(usage) = usage {
                    let total = self.cost.on_usage(&usage);
                    self.publish(DashboardEvent::CallCost { cost_cents: total });
                }
                self.set_ai_state(AiStateKind::Listening);
                false
            }
            RealtimeEvent::Interrupted => {
                let cleared = self.tx_queue.clear();
                self.tx_reframer.reset();
                if cleared > 0 {
                    tracing::info!("barge-in: cleared {} queued frames", cleared);
                }
                self.set_ai_state(AiStateKind::UserSpeaking);
                false
            }
            RealtimeEvent::SpeechStopped => {
                self.set_ai_state(AiStateKind::Thinking);
                false
            }
            RealtimeEvent::FunctionCall {
                call_id,
                name,
                arguments,
            } => {
                self.publish(DashboardEvent::FunctionCall {
                    name: name.clone(),
                    args: arguments.clone(),
                });
                let outcome = self.manager.execute_tool(&name, arguments).await;
                self.handle_outcome(&call_id, &name, outcome).await
            }
            RealtimeEvent::Disconnected => self.handle_ai_disconnect().await,
        }
    }

    /// Translate a tool outcome into platform actions; returns true when the
    /// call should end
    async fn handle_outcome(&mut self, call_id: &str, name: &str, outcome: ToolOutcome) -> bool {
        match outcome {
            ToolOutcome::Reply(text) => {
                if let Err(e) = self.session.send_function_result(call_id, &text).await {
                    tracing::warn!("function result failed: {}", e);
                }
                self.publish(DashboardEvent::FunctionResult {
                    name: name.to_string(),
                    result: truncate(&text, 200),
                });
                false
            }
            ToolOutcome::Blocked => {
                let text =
                    "Fehler: Anruf nicht freigeschaltet. Bitte zuerst den Zugangs-Code nennen.";
                if let Err(e) = self.session.send_function_result(call_id, text).await {
                    tracing::warn!("function result failed: {}", e);
                }
                self.publish(DashboardEvent::FunctionResult {
                    name: name.to_string(),
                    result: "blocked".to_string(),
                });
                false
            }
            ToolOutcome::Beep => {
                tracing::info!("wrong unlock code, sending beep");

                // Suppress the AI's spoken reaction; the beep is the answer
                self.session.mute_until_response_done();
                self.queue_beep();
                if self.gate_deadline.is_some() {
                    self.gate_deadline = Some(Instant::now() + GATE_TIMEOUT);
                }

                let text = "Falscher Code. Sage nichts. Warte auf die naechste Eingabe.";
                if let Err(e) = self.session.send_function_result(call_id, text).await {
                    tracing::warn!("function result failed: {}", e);
                }
                self.publish(DashboardEvent::FunctionResult {
                    name: name.to_string(),
                    result: "wrong code (beep)".to_string(),
                });
                false
            }
            ToolOutcome::Hangup(cause) => {
                let reason = match cause {
                    HangupCause::SecurityFailed => {
                        self.record_security_failure().await;
                        "security_failed"
                    }
                    HangupCause::UserRequested => "user_hangup",
                };
                tracing::info!("hanging up: {}", reason);

                self.session.mute_until_response_done();
                let _ = self
                    .session
                    .send_function_result(call_id, "Anruf wird beendet.")
                    .await;
                self.publish(DashboardEvent::FunctionResult {
                    name: name.to_string(),
                    result: "hangup".to_string(),
                });

                self.end_reason = Some(reason.to_string());
                let _ = self.deps.sip.hangup().await;
                true
            }
            ToolOutcome::SwitchModel(choice) => {
                self.user_model = choice;
                self.publish(DashboardEvent::FunctionResult {
                    name: name.to_string(),
                    result: format!("model: {}", choice),
                });
                self.apply_model(choice).await;
                false
            }
            ToolOutcome::Switch(target) => {
                match self.manager.switch_agent(&target).await {
                    Ok((old, new)) => {
                        if old != new {
                            // Leaving the gate unlocks the call
                            if new != SECURITY_AGENT_NAME {
                                self.manager.set_unlocked(true);
                                self.gate_deadline = None;
                            }
                            self.publish(DashboardEvent::AgentChanged {
                                old_agent: old,
                                new_agent: new.clone(),
                            });
                        }

                        let preferred = self
                            .manager
                            .active()
                            .await
                            .and_then(|a| a.preferred_model);
                        let target_model = preferred.unwrap_or(self.user_model);

                        if target_model != self.current_model {
                            // Reconnect under the new model with the new
                            // agent's tools already configured
                            self.apply_model(target_model).await;
                        } else {
                            let tools = self.manager.tools().await;
                            let instructions = self.manager.instructions().await;
                            if let Err(e) = self.session.update_session(tools, instructions).await {
                                tracing::warn!("session update failed: {}", e);
                            }
                            let display = self
                                .manager
                                .active()
                                .await
                                .map(|a| a.display_name.clone())
                                .unwrap_or_else(|| new.clone());
                            let text = format!("Du bist jetzt verbunden mit: {}", display);
                            if let Err(e) =
                                self.session.send_function_result(call_id, &text).await
                            {
                                tracing::warn!("function result failed: {}", e);
                            }
                        }

                        self.publish(DashboardEvent::FunctionResult {
                            name: name.to_string(),
                            result: format!("agent: {}", new),
                        });
                    }
                    Err(e) => {
                        tracing::warn!("agent switch failed: {}", e);
                        let text = format!("Agent-Wechsel fehlgeschlagen: {}", e);
                        let _ = self.session.send_function_result(call_id, &text).await;
                        self.publish(DashboardEvent::FunctionResult {
                            name: name.to_string(),
                            result: "switch failed".to_string(),
                        });
                    }
                }
                false
            }
        }
    }

    /// Reconnect the session against another model tier.
    /// The TX queue keeps draining to SIP throughout, so the caller hears no
    /// gap beyond the socket turnaround.
    async fn apply_model(&mut self, choice: ModelChoice) {
        self.current_model = choice;
        self.cost.set_model(choice);

        self.session
            .configure(SessionConfig {
                tools: self.manager.tools().await,
                instructions: self.manager.instructions().await,
                voice: self.deps.config.ai.voice.clone(),
            })
            .await;

        let model_id = self.deps.config.ai.model_id(choice).to_string();
        match self.session.switch_model_live(&model_id).await {
            Ok(()) => {
                tracing::info!("model switched to {} ({})", choice, model_id);
                self.publish(DashboardEvent::ModelChanged {
                    model: choice.to_string(),
                });
            }
            Err(e) => {
                tracing::error!("model switch failed: {}", e);
            }
        }
    }

    /// Dropped websocket mid-call: reconnect with backoff, else give up
    async fn handle_ai_disconnect(&mut self) -> bool {
        if self.end_reason.is_some() || self.cancel.is_cancelled() {
            return true;
        }
        tracing::warn!("AI websocket dropped, reconnecting");

        let model_id = self.deps.config.ai.model_id(self.current_model).to_string();
        for delay in AI_RECONNECT_DELAYS {
            tokio::time::sleep(delay).await;
            match self.session.connect(&model_id).await {
                Ok(()) => {
                    tracing::info!("AI session reconnected");
                    return false;
                }
                Err(e) => tracing::warn!("AI reconnect failed: {}", e),
            }
        }

        tracing::error!("AI session unrecoverable, ending call");
        self.end_reason = Some("ai_disconnected".to_string());
        let _ = self.deps.sip.hangup().await;
        true
    }

    /// Handle a dashboard command; returns true when the call should end
    async fn handle_command(&mut self, command: SupervisorCommand) -> bool {
        match command {
            SupervisorCommand::Hangup => {
                tracing::info!("dashboard requested hangup");
                self.end_reason = Some("dashboard_hangup".to_string());
                let _ = self.deps.sip.hangup().await;
                true
            }
            SupervisorCommand::MuteAi => {
                self.session.set_muted(true);
                false
            }
            SupervisorCommand::UnmuteAi => {
                self.session.set_muted(false);
                false
            }
            SupervisorCommand::SwitchAgent(target) => {
                // The gate is not a valid manual target
                if target == SECURITY_AGENT_NAME {
                    tracing::warn!("dashboard tried to switch to the security gate, refused");
                    return false;
                }
                match self.manager.switch_agent(&target).await {
                    Ok((old, new)) => {
                        if old != new {
                            self.publish(DashboardEvent::AgentChanged {
                                old_agent: old,
                                new_agent: new,
                            });
                            let tools = self.manager.tools().await;
                            let instructions = self.manager.instructions().await;
                            if let Err(e) = self.session.update_session(tools, instructions).await {
                                tracing::warn!("session update failed: {}", e);
                            }
                        }
                    }
                    Err(e) => tracing::warn!("dashboard agent switch failed: {}", e),
                }
                false
            }
            SupervisorCommand::SipEnded(reason) => {
                if self.end_reason.is_none() {
                    self.end_reason = Some(reason);
                }
                true
            }
        }
    }

    /// 15s of gate silence: end the call without touching the failure log
    async fn handle_gate_timeout(&mut self) -> bool {
        if self.manager.active_name().await.as_deref() != Some(SECURITY_AGENT_NAME) {
            self.gate_deadline = None;
            return false;
        }
        tracing::warn!("gate timeout: no caller input for {:?}", GATE_TIMEOUT);
        self.end_reason = Some("gate_timeout".to_string());
        let _ = self.deps.sip.hangup().await;
        true
    }

    /// Book a failed-unlock entry and promote to blacklist when due
    async fn record_security_failure(&self) {
        if let Err(e) = self.deps.access.record_failed_unlock(&self.caller_id).await {
            tracing::error!("failed-unlock record error: {}", e);
            return;
        }
        match self
            .deps
            .access
            .check_and_auto_blacklist(&self.caller_id)
            .await
        {
            Ok(true) => {
                self.publish(DashboardEvent::BlacklistUpdated {});
            }
            Ok(false) => {}
            Err(e) => tracing::error!("auto-blacklist check error: {}", e),
        }
    }

    /// Queue the cached beep onto the SIP TX stream, padded to whole frames
    fn queue_beep(&self) {
        let rate = SampleRate::Hz48000;
        let frame_len = rate.samples_per_frame();
        for chunk in beep().chunks(frame_len) {
            let mut samples = chunk.to_vec();
            samples.resize(frame_len, 0);
            self.tx_queue.push(Frame::new(samples, rate));
        }
    }

    fn set_ai_state(&mut self, state: AiStateKind) {
        if self.ai_state != state {
            self.ai_state = state;
            self.publish(DashboardEvent::AiState { state });
        }
    }

    fn publish(&self, event: DashboardEvent) {
        let _ = self.deps.events.send(event);
    }

    /// Deterministic teardown: stop loops, close the session, seal the record
    async fn finalize(&mut self) {
        let reason = self
            .end_reason
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        tracing::info!("finalising call {} ({})", self.call_id, reason);

        self.cancel.cancel();
        self.tx_queue.clear();
        self.session.disconnect().await;
        self.manager.end_call().await;

        // The session resets its flags on disconnect; a call must never be
        // sealed with a response still marked in progress.
        debug_assert!(!self.session.response_in_progress());

        // Join the media loops; past the deadline they are abandoned (their
        // queues have no producer left)
        for mut handle in self.tasks.drain(..) {
            if tokio::time::timeout(JOIN_DEADLINE, &mut handle).await.is_err() {
                tracing::warn!("per-call task did not stop within {:?}", JOIN_DEADLINE);
            }
        }

        let ended_at = Utc::now();
        let duration = (ended_at - self.started_at).num_seconds().max(0);

        if !self.assistant_line.is_empty() {
            self.transcript.push(TranscriptLine {
                role: "assistant".to_string(),
                text: std::mem::take(&mut self.assistant_line),
            });
        }

        let logs = self.deps.call_log.detach();
        if let Err(e) = db::calls::finalize(
            &self.deps.pool,
            &self.call_id,
            ended_at,
            duration,
            self.cost.cost_cents(),
            &self.transcript,
            &logs,
        )
        .await
        {
            tracing::error!("could not seal call record: {}", e);
        }

        self.publish(DashboardEvent::CallEnded { reason });
        self.publish(DashboardEvent::AiState {
            state: AiStateKind::Idle,
        });
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 200), "short");
        let truncated = truncate("grüße aus der Zentrale", 6);
        assert!(truncated.starts_with("grü"));
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn test_beep_padding_yields_whole_frames() {
        // 150ms at 48kHz is 7200 samples: 7 full frames and a 480-sample tail
        let frame_len = SampleRate::Hz48000.samples_per_frame();
        let queue = FrameQueue::new("test-tx", 64);

        for chunk in beep().chunks(frame_len) {
            let mut samples = chunk.to_vec();
            samples.resize(frame_len, 0);
            queue.push(Frame::new(samples, SampleRate::Hz48000));
        }

        assert_eq!(queue.len(), 8);
        let mut total = 0;
        while let Some(frame) = queue.pop() {
            assert_eq!(frame.len(), 960);
            total += frame.len();
        }
        assert_eq!(total, 7680); // 7200 beep samples + 480 zero padding
    }
}
