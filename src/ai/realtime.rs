//! Realtime API Websocket Client
//!
//! One persistent connection per call, recreated on model switch. Tools and
//! instructions come from the active agent, never hardcoded here. The
//! `response_in_progress` flag is driven exclusively by server events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::pricing::Usage;
use super::AiError;

const DEFAULT_BASE_URL: &str = "wss://api.openai.com/v1/realtime?model=";

/// How long a function result waits for the previous response to finish
const RESULT_WAIT_MAX: Duration = Duration::from_secs(5);
const RESULT_WAIT_STEP: Duration = Duration::from_millis(100);

/// Backoff applied when the server reports an already-active response
const ACTIVE_RESPONSE_BACKOFF: Duration = Duration::from_millis(250);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Tools and instructions for the current agent
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub tools: Vec<serde_json::Value>,
    pub instructions: String,
    pub voice: String,
}

/// Events surfaced to the call supervisor
#[derive(Debug)]
pub enum RealtimeEvent {
    /// PCM16 audio at 24kHz (already suppressed while muted)
    Audio(Vec<u8>),
    /// Transcript line; role is "user" or "assistant"
    Transcript {
        role: &'static str,
        text: String,
        is_final: bool,
    },
    /// The server started generating a response
    ResponseStarted,
    /// The server finished a response; usage drives cost accounting
    ResponseDone { usage: Option<Usage> },
    /// Caller barge-in: clear the TX queue
    Interrupted,
    /// Caller stopped speaking (server VAD)
    SpeechStopped,
    /// Tool invocation requested by the model
    FunctionCall {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// The websocket closed (network or server side)
    Disconnected,
}

#[derive(Default)]
struct SessionFlags {
    response_in_progress: AtomicBool,
    muted: AtomicBool,
    unmute_after_next_response: AtomicBool,
    connected: AtomicBool,
}

/// Client for the realtime speech-to-speech endpoint
pub struct RealtimeSession {
    api_key: String,
    base_url: String,
    model: RwLock<String>,
    config: RwLock<SessionConfig>,
    sink: Mutex<Option<WsSink>>,
    downlink: Mutex<Option<JoinHandle<()>>>,
    flags: Arc<SessionFlags>,
    event_tx: mpsc::UnboundedSender<RealtimeEvent>,
}

impl RealtimeSession {
    pub fn new(api_key: String, event_tx: mpsc::UnboundedSender<RealtimeEvent>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: RwLock::new(String::new()),
            config: RwLock::new(SessionConfig::default()),
            sink: Mutex::new(None),
            downlink: Mutex::new(None),
            flags: Arc::new(SessionFlags::default()),
            event_tx,
        }
    }

    /// Override the endpoint base URL (tests, self-hosted gateways)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_connected(&self) -> bool {
        self.flags.connected.load(Ordering::SeqCst)
    }

    pub fn response_in_progress(&self) -> bool {
        self.flags.response_in_progress.load(Ordering::SeqCst)
    }

    pub fn muted(&self) -> bool {
        self.flags.muted.load(Ordering::SeqCst)
    }

    pub fn set_muted(&self, muted: bool) {
        self.flags.muted.store(muted, Ordering::SeqCst);
    }

    /// Mute now and automatically unmute once the current response finishes
    pub fn mute_until_response_done(&self) {
        self.flags.muted.store(true, Ordering::SeqCst);
        self.flags
            .unmute_after_next_response
            .store(true, Ordering::SeqCst);
    }

    pub async fn model(&self) -> String {
        self.model.read().await.clone()
    }

    /// Store tools and instructions for the next connect / session update
    pub async fn configure(&self, config: SessionConfig) {
        tracing::info!(
            "session configured: {} tools, {} chars instructions",
            config.tools.len(),
            config.instructions.len()
        );
        *self.config.write().await = config;
    }

    /// Connect against the given model and send the session configuration
    pub async fn connect(&self, model_id: &str) -> Result<(), AiError> {
        let url = format!("{}{}", self.base_url, model_id);
        tracing::info!("connecting realtime session, model {}", model_id);

        let mut request = url
            .clone()
            .into_client_request()
            .map_err(|e| AiError::Connect(format!("bad endpoint {}: {}", url, e)))?;
        {
            let headers = request.headers_mut();
            headers.insert(
                "Authorization",
                HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                    .map_err(|e| AiError::Connect(e.to_string()))?,
            );
            headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));
        }

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| AiError::Connect(e.to_string()))?;

        let (sink, stream) = ws.split();
        *self.sink.lock().await = Some(sink);
        *self.model.write().await = model_id.to_string();
        self.flags.connected.store(true, Ordering::SeqCst);

        self.send_session_update_full().await?;

        // Downlink loop
        let flags = self.flags.clone();
        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if let Ok(event) = serde_json::from_str::<serde_json::Value>(&text) {
                            handle_server_event(&event, &flags, &event_tx);
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            flags.connected.store(false, Ordering::SeqCst);
            flags.response_in_progress.store(false, Ordering::SeqCst);
            let _ = event_tx.send(RealtimeEvent::Disconnected);
        });
        *self.downlink.lock().await = Some(handle);

        tracing::info!("realtime session connected");
        Ok(())
    }

    /// Full session.update with audio formats, VAD and the agent config
    async fn send_session_update_full(&self) -> Result<(), AiError> {
        let config = self.config.read().await.clone();
        let payload = serde_json::json!({
            "type": "session.update",
            "session": {
                "modalities": ["text", "audio"],
                "instructions": config.instructions,
                "voice": config.voice,
                "input_audio_format": "pcm16",
                "output_audio_format": "pcm16",
                "input_audio_transcription": { "model": "whisper-1" },
                "turn_detection": {
                    "type": "server_vad",
                    "threshold": 0.4,
                    "prefix_padding_ms": 200,
                    "silence_duration_ms": 400,
                    "create_response": true
                },
                "tools": config.tools,
                "tool_choice": "auto"
            }
        });
        self.send(&payload).await
    }

    /// Update tools/instructions on the running session (agent switch)
    pub async fn update_session(
        &self,
        tools: Vec<serde_json::Value>,
        instructions: String,
    ) -> Result<(), AiError> {
        {
            let mut config = self.config.write().await;
            config.tools = tools.clone();
            config.instructions = instructions.clone();
        }
        let payload = serde_json::json!({
            "type": "session.update",
            "session": {
                "tools": tools,
                "instructions": instructions,
            }
        });
        self.send(&payload).await
    }

    /// Append one 16kHz PCM16 frame to the input buffer
    pub async fn send_audio(&self, pcm16: &[u8]) -> Result<(), AiError> {
        let payload = serde_json::json!({
            "type": "input_audio_buffer.append",
            "audio": BASE64.encode(pcm16),
        });
        self.send(&payload).await
    }

    /// Manually request a response (initial greeting). No-op while one is
    /// already in progress.
    pub async fn trigger_response(&self) -> Result<(), AiError> {
        if self.response_in_progress() {
            tracing::warn!("response already in progress, greeting skipped");
            return Ok(());
        }
        self.flags.response_in_progress.store(true, Ordering::SeqCst);
        let result = self.send(&serde_json::json!({ "type": "response.create" })).await;
        if result.is_err() {
            self.flags
                .response_in_progress
                .store(false, Ordering::SeqCst);
        }
        result
    }

    /// Return a tool result to the model and request the follow-up response.
    ///
    /// The follow-up `response.create` is only sent once no response is in
    /// progress; the wait is bounded, with one extra backoff for the
    /// "already has an active response" race.
    pub async fn send_function_result(&self, call_id: &str, output: &str) -> Result<(), AiError> {
        let item = serde_json::json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": call_id,
                "output": output,
            }
        });
        self.send(&item).await?;

        let mut waited = Duration::ZERO;
        while self.response_in_progress() && waited < RESULT_WAIT_MAX {
            tokio::time::sleep(RESULT_WAIT_STEP).await;
            waited += RESULT_WAIT_STEP;
        }
        if self.response_in_progress() {
            // Recoverable race: give the server one more beat, then proceed
            tokio::time::sleep(ACTIVE_RESPONSE_BACKOFF).await;
        }

        self.flags.response_in_progress.store(true, Ordering::SeqCst);
        let result = self.send(&serde_json::json!({ "type": "response.create" })).await;
        if result.is_err() {
            self.flags
                .response_in_progress
                .store(false, Ordering::SeqCst);
        }

        tracing::info!("function result sent for call_id={}", call_id);
        result
    }

    /// Close the current websocket and reconnect against a different model.
    ///
    /// The caller-facing TX queue lives in the supervisor, so caller audio is
    /// uninterrupted while the socket turns around.
    pub async fn switch_model_live(&self, model_id: &str) -> Result<(), AiError> {
        tracing::info!("live model switch -> {}", model_id);
        self.teardown_socket().await;
        self.flags
            .response_in_progress
            .store(false, Ordering::SeqCst);
        self.connect(model_id).await
    }

    /// Disconnect and clear all per-call flags
    pub async fn disconnect(&self) {
        self.teardown_socket().await;
        self.flags.response_in_progress.store(false, Ordering::SeqCst);
        self.flags.muted.store(false, Ordering::SeqCst);
        self.flags
            .unmute_after_next_response
            .store(false, Ordering::SeqCst);
        tracing::info!("realtime session disconnected");
    }

    async fn teardown_socket(&self) {
        if let Some(handle) = self.downlink.lock().await.take() {
            handle.abort();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.flags.connected.store(false, Ordering::SeqCst);
    }

    async fn send(&self, payload: &serde_json::Value) -> Result<(), AiError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(AiError::NotConnected)?;
        sink.send(Message::Text(payload.to_string().into()))
            .await
            .map_err(|e| AiError::Send(e.to_string()))
    }
}

/// Dispatch one server event from the realtime API
fn handle_server_event(
    event: &serde_json::Value,
    flags: &SessionFlags,
    event_tx: &mpsc::UnboundedSender<RealtimeEvent>,
) {
    let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");

    match event_type {
        "response.created" => {
            flags.response_in_progress.store(true, Ordering::SeqCst);
            let _ = event_tx.send(RealtimeEvent::ResponseStarted);
        }
        "response.done" => {
            flags.response_in_progress.store(false, Ordering::SeqCst);
            if flags
                .unmute_after_next_response
                .swap(false, Ordering::SeqCst)
            {
                flags.muted.store(false, Ordering::SeqCst);
            }
            let usage = event
                .pointer("/response/usage")
                .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());
            let _ = event_tx.send(RealtimeEvent::ResponseDone { usage });
        }
        "response.audio.delta" => {
            if flags.muted.load(Ordering::SeqCst) {
                return;
            }
            if let Some(b64) = event.get("delta").and_then(|d| d.as_str()) {
                if let Ok(bytes) = BASE64.decode(b64) {
                    let _ = event_tx.send(RealtimeEvent::Audio(bytes));
                }
            }
        }
        "response.audio_transcript.delta" => {
            if let Some(text) = event.get("delta").and_then(|d| d.as_str()) {
                if !text.is_empty() {
                    let _ = event_tx.send(RealtimeEvent::Transcript {
                        role: "assistant",
                        text: text.to_string(),
                        is_final: false,
                    });
                }
            }
        }
        "response.audio_transcript.done" => {
            if let Some(text) = event.get("transcript").and_then(|d| d.as_str()) {
                if !text.is_empty() {
                    let _ = event_tx.send(RealtimeEvent::Transcript {
                        role: "assistant",
                        text: text.to_string(),
                        is_final: true,
                    });
                }
            }
        }
        "conversation.item.input_audio_transcription.completed" => {
            if let Some(text) = event.get("transcript").and_then(|d| d.as_str()) {
                if !text.is_empty() {
                    let _ = event_tx.send(RealtimeEvent::Transcript {
                        role: "user",
                        text: text.to_string(),
                        is_final: true,
                    });
                }
            }
        }
        "input_audio_buffer.speech_started" => {
            // Caller interrupts: any running response is moot
            flags.response_in_progress.store(false, Ordering::SeqCst);
            let _ = event_tx.send(RealtimeEvent::Interrupted);
        }
        "input_audio_buffer.speech_stopped" => {
            let _ = event_tx.send(RealtimeEvent::SpeechStopped);
        }
        "response.function_call_arguments.done" => {
            let call_id = event
                .get("call_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let name = event
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let arguments = event
                .get("arguments")
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_else(|| serde_json::json!({}));

            tracing::info!("function call: {}({})", name, arguments);
            let _ = event_tx.send(RealtimeEvent::FunctionCall {
                call_id,
                name,
                arguments,
            });
        }
        "error" => {
            let message = event
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("");
            tracing::error!("realtime API error: {}", message);
            // The active-response race resolves itself via response.done;
            // every other error means no response is running anymore.
            if !message.contains("already has an active response") {
                flags.response_in_progress.store(false, Ordering::SeqCst);
            }
        }
        _ => {
            tracing::debug!("realtime event: {}", event_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_events() -> (
        Arc<SessionFlags>,
        mpsc::UnboundedSender<RealtimeEvent>,
        mpsc::UnboundedReceiver<RealtimeEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(SessionFlags::default()), tx, rx)
    }

    #[test]
    fn test_response_lifecycle_flags() {
        let (flags, tx, mut rx) = session_with_events();

        let created = serde_json::json!({"type": "response.created"});
        handle_server_event(&created, &flags, &tx);
        assert!(flags.response_in_progress.load(Ordering::SeqCst));
        assert!(matches!(rx.try_recv(), Ok(RealtimeEvent::ResponseStarted)));

        let done = serde_json::json!({"type": "response.done"});
        handle_server_event(&done, &flags, &tx);
        assert!(!flags.response_in_progress.load(Ordering::SeqCst));
        assert!(matches!(
            rx.try_recv(),
            Ok(RealtimeEvent::ResponseDone { usage: None })
        ));
    }

    #[test]
    fn test_speech_started_clears_response_and_interrupts() {
        let (flags, tx, mut rx) = session_with_events();
        flags.response_in_progress.store(true, Ordering::SeqCst);

        let event = serde_json::json!({"type": "input_audio_buffer.speech_started"});
        handle_server_event(&event, &flags, &tx);

        assert!(!flags.response_in_progress.load(Ordering::SeqCst));
        assert!(matches!(rx.try_recv(), Ok(RealtimeEvent::Interrupted)));
    }

    #[test]
    fn test_audio_suppressed_while_muted() {
        let (flags, tx, mut rx) = session_with_events();
        let audio = serde_json::json!({
            "type": "response.audio.delta",
            "delta": BASE64.encode([0u8, 1, 2, 3]),
        });

        flags.muted.store(true, Ordering::SeqCst);
        handle_server_event(&audio, &flags, &tx);
        assert!(rx.try_recv().is_err());

        flags.muted.store(false, Ordering::SeqCst);
        handle_server_event(&audio, &flags, &tx);
        match rx.try_recv() {
            Ok(RealtimeEvent::Audio(bytes)) => assert_eq!(bytes, vec![0u8, 1, 2, 3]),
            other => panic!("expected audio, got {:?}", other),
        }
    }

    #[test]
    fn test_unmute_after_next_response() {
        let (flags, tx, _rx) = session_with_events();
        flags.muted.store(true, Ordering::SeqCst);
        flags
            .unmute_after_next_response
            .store(true, Ordering::SeqCst);

        let done = serde_json::json!({"type": "response.done"});
        handle_server_event(&done, &flags, &tx);

        assert!(!flags.muted.load(Ordering::SeqCst));
        assert!(!flags.unmute_after_next_response.load(Ordering::SeqCst));
    }

    #[test]
    fn test_function_call_event_parsed() {
        let (flags, tx, mut rx) = session_with_events();
        let event = serde_json::json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_1",
            "name": "unlock",
            "arguments": "{\"code\": \"7234\"}",
        });
        handle_server_event(&event, &flags, &tx);

        match rx.try_recv() {
            Ok(RealtimeEvent::FunctionCall {
                call_id,
                name,
                arguments,
            }) => {
                assert_eq!(call_id, "call_1");
                assert_eq!(name, "unlock");
                assert_eq!(arguments["code"], "7234");
            }
            other => panic!("expected function call, got {:?}", other),
        }
    }

    #[test]
    fn test_active_response_error_keeps_flag() {
        let (flags, tx, _rx) = session_with_events();
        flags.response_in_progress.store(true, Ordering::SeqCst);

        let racy = serde_json::json!({
            "type": "error",
            "error": {"message": "conversation already has an active response"},
        });
        handle_server_event(&racy, &flags, &tx);
        assert!(flags.response_in_progress.load(Ordering::SeqCst));

        let fatal = serde_json::json!({
            "type": "error",
            "error": {"message": "session expired"},
        });
        handle_server_event(&fatal, &flags, &tx);
        assert!(!flags.response_in_progress.load(Ordering::SeqCst));
    }

    #[test]
    fn test_usage_extracted_from_response_done() {
        let (flags, tx, mut rx) = session_with_events();
        let done = serde_json::json!({
            "type": "response.done",
            "response": {
                "usage": {
                    "input_tokens": 10,
                    "output_tokens": 20,
                    "input_token_details": {"text_tokens": 4, "audio_tokens": 6},
                    "output_token_details": {"text_tokens": 8, "audio_tokens": 12},
                }
            }
        });
        handle_server_event(&done, &flags, &tx);

        match rx.try_recv() {
            Ok(RealtimeEvent::ResponseDone { usage: Some(u) }) => {
                assert_eq!(u.input_token_details.audio_tokens, 6);
                assert_eq!(u.output_token_details.audio_tokens, 12);
            }
            other => panic!("expected usage, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = RealtimeSession::new("sk-test".into(), tx);
        assert!(matches!(
            session.send_audio(&[0, 0]).await,
            Err(AiError::NotConnected)
        ));
    }
}
