//! Shared Data Types
//!
//! Row and API types for calls, access records and background tasks.

mod access;
mod call;
mod task;

pub use access::{BlacklistEntry, FailedUnlock, WhitelistEntry};
pub use call::{CallRecord, TranscriptLine};
pub use task::{TaskRecord, TaskStatus};
