//! Access Records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blocked caller; inbound is rejected before media
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BlacklistEntry {
    pub caller_id: String,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
}

/// Trusted caller; skips the security gate
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WhitelistEntry {
    pub caller_id: String,
    pub note: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// One failed unlock attempt inside the rolling auto-blacklist window
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FailedUnlock {
    pub caller_id: String,
    pub failed_at: DateTime<Utc>,
}
