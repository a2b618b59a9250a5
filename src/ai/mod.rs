//! Realtime AI Session
//!
//! Persistent websocket to the realtime speech-to-speech endpoint: audio up,
//! audio/transcripts/tool-calls down, with an explicit response-in-progress
//! state machine and live model hot-swapping.

mod pricing;
mod realtime;

pub use pricing::{CostTracker, ModelChoice, PriceTable, TokenDetails, TokenPrices, Usage};
pub use realtime::{RealtimeEvent, RealtimeSession, SessionConfig};

use thiserror::Error;

/// Realtime-session errors
#[derive(Error, Debug)]
pub enum AiError {
    #[error("websocket connect failed: {0}")]
    Connect(String),

    #[error("websocket send failed: {0}")]
    Send(String),

    #[error("not connected")]
    NotConnected,

    #[error("unknown model: {0}")]
    UnknownModel(String),
}
