//! SIP/RTP Telephony Adapter
//!
//! Registers a user agent against the PSTN trunk, answers inbound INVITEs
//! behind NAT and bridges bidirectional 48kHz PCM to the call supervisor.
//! Codec preference is Opus 48k, then PCMA, then PCMU.

mod codec;
mod config;
mod rtp;
mod sdp;
mod user_agent;

pub use codec::{negotiate, AudioCodec, CodecKind};
pub use config::SipConfig;
pub use rtp::{MediaChannels, RtpSession, RX_QUEUE_FRAMES, TX_QUEUE_FRAMES};
pub use user_agent::{
    extract_caller_id, CallDecision, IncomingDecider, RegistrationState, SipEvent, SipUserAgent,
};

use thiserror::Error;

/// SIP-related errors
#[derive(Error, Debug)]
pub enum SipError {
    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    #[error("authentication rejected by registrar")]
    AuthRejected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("SDP error: {0}")]
    Sdp(String),

    #[error("RTP error: {0}")]
    Rtp(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("no active call")]
    NoActiveCall,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
