//! VoiceGate - SIP Voice-Agent Gateway
//!
//! Answers inbound SIP calls from a PSTN trunk, bridges the call audio in
//! real time to the OpenAI realtime API, and steers the conversation through
//! swappable tool-equipped agents. Every call starts behind a security gate
//! that demands a spoken unlock code; a dashboard observes and controls live
//! calls over WebSocket + REST.

pub mod access;
pub mod agents;
pub mod ai;
pub mod audio;
pub mod call;
pub mod config;
pub mod db;
pub mod models;
pub mod runtime;
pub mod server;
pub mod sip;
