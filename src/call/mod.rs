//! Per-Call Supervision
//!
//! One supervisor per accepted call owns every per-call resource: the media
//! queues, the AI session, the agent manager and the log capture. It
//! guarantees deterministic teardown and publishes everything the dashboard
//! sees.

mod call_log;
mod events;
mod supervisor;

pub use call_log::{CallLogBuffer, CallLogLayer};
pub use events::{AiStateKind, DashboardEvent};
pub use supervisor::{CallSupervisor, SupervisorCommand, SupervisorDeps};
