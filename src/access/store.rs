//! Access Store
//!
//! Shared across calls and the dashboard; every read-modify-write runs under
//! one async mutex (contention is one live call plus the operator).

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::models::{BlacklistEntry, WhitelistEntry};

/// Failed unlock attempts before a number is auto-blocked
const MAX_FAILED_CALLS: i64 = 3;
/// Rolling window for counting failures
const FAILED_CALLS_WINDOW_HOURS: i64 = 12;

/// Reason string written by the auto-promotion path
pub const AUTO_BLACKLIST_REASON: &str = "auto: 3 failed unlocks";

pub struct AccessStore {
    pool: SqlitePool,
    write_lock: Mutex<()>,
}

impl AccessStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    // ---- blacklist ----

    pub async fn is_blacklisted(&self, caller_id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT caller_id FROM blacklist WHERE caller_id = ?")
                .bind(caller_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn add_to_blacklist(&self, caller_id: &str, reason: &str) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "INSERT OR REPLACE INTO blacklist (caller_id, reason, blocked_at) VALUES (?, ?, ?)",
        )
        .bind(caller_id)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        tracing::warn!("caller blacklisted: {} ({})", caller_id, reason);
        Ok(())
    }

    /// Remove a number from the blacklist. Also wipes its failed-unlock
    /// history so three fresh failures are needed to re-block it.
    pub async fn remove_from_blacklist(&self, caller_id: &str) -> Result<bool, sqlx::Error> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM blacklist WHERE caller_id = ?")
            .bind(caller_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM failed_unlock_calls WHERE caller_id = ?")
            .bind(caller_id)
            .execute(&self.pool)
            .await?;

        tracing::info!("caller unblocked, failure history wiped: {}", caller_id);
        Ok(true)
    }

    pub async fn blacklist_entry(
        &self,
        caller_id: &str,
    ) -> Result<Option<BlacklistEntry>, sqlx::Error> {
        sqlx::query_as::<_, BlacklistEntry>(
            "SELECT caller_id, reason, blocked_at FROM blacklist WHERE caller_id = ?",
        )
        .bind(caller_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn blacklist(&self) -> Result<Vec<BlacklistEntry>, sqlx::Error> {
        sqlx::query_as::<_, BlacklistEntry>(
            "SELECT caller_id, reason, blocked_at FROM blacklist ORDER BY blocked_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    // ---- whitelist ----

    pub async fn is_whitelisted(&self, caller_id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT caller_id FROM whitelist WHERE caller_id = ?")
                .bind(caller_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    pub async fn add_to_whitelist(
        &self,
        caller_id: &str,
        note: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("INSERT OR REPLACE INTO whitelist (caller_id, note, added_at) VALUES (?, ?, ?)")
            .bind(caller_id)
            .bind(note)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        tracing::info!("caller whitelisted: {}", caller_id);
        Ok(())
    }

    pub async fn remove_from_whitelist(&self, caller_id: &str) -> Result<bool, sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM whitelist WHERE caller_id = ?")
            .bind(caller_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn whitelist(&self) -> Result<Vec<WhitelistEntry>, sqlx::Error> {
        sqlx::query_as::<_, WhitelistEntry>(
            "SELECT caller_id, note, added_at FROM whitelist ORDER BY added_at DESC",
        )
        .fetch_all(&self.pool)
        .await
    }

    // ---- failed unlocks / auto-promotion ----

    /// Record one failed unlock attempt for the caller
    pub async fn record_failed_unlock(&self, caller_id: &str) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("INSERT INTO failed_unlock_calls (caller_id, failed_at) VALUES (?, ?)")
            .bind(caller_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        tracing::info!("failed unlock recorded: {}", caller_id);
        Ok(())
    }

    /// Count the caller's failures in the rolling window
    pub async fn failed_unlock_count(&self, caller_id: &str) -> Result<i64, sqlx::Error> {
        let cutoff = Utc::now() - Duration::hours(FAILED_CALLS_WINDOW_HOURS);
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM failed_unlock_calls WHERE caller_id = ? AND failed_at > ?",
        )
        .bind(caller_id)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Promote the caller to the blacklist when the window threshold is hit.
    /// Returns true when the number was blocked by this call.
    pub async fn check_and_auto_blacklist(&self, caller_id: &str) -> Result<bool, sqlx::Error> {
        if self.is_blacklisted(caller_id).await? {
            return Ok(false);
        }

        let count = self.failed_unlock_count(caller_id).await?;
        if count >= MAX_FAILED_CALLS {
            self.add_to_blacklist(caller_id, AUTO_BLACKLIST_REASON).await?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    async fn store() -> AccessStore {
        AccessStore::new(init_memory_pool().await.unwrap())
    }

    #[tokio::test]
    async fn test_blacklist_roundtrip() {
        let store = store().await;
        assert!(!store.is_blacklisted("123").await.unwrap());

        store.add_to_blacklist("123", "manual").await.unwrap();
        assert!(store.is_blacklisted("123").await.unwrap());
        assert_eq!(store.blacklist().await.unwrap().len(), 1);

        assert!(store.remove_from_blacklist("123").await.unwrap());
        assert!(!store.is_blacklisted("123").await.unwrap());
        assert!(!store.remove_from_blacklist("123").await.unwrap());
    }

    #[tokio::test]
    async fn test_whitelist_roundtrip() {
        let store = store().await;
        store.add_to_whitelist("456", Some("office")).await.unwrap();
        assert!(store.is_whitelisted("456").await.unwrap());

        let entries = store.whitelist().await.unwrap();
        assert_eq!(entries[0].note.as_deref(), Some("office"));

        assert!(store.remove_from_whitelist("456").await.unwrap());
        assert!(!store.is_whitelisted("456").await.unwrap());
    }

    #[tokio::test]
    async fn test_auto_blacklist_after_three_failures() {
        let store = store().await;
        let caller = "015901969502";

        for _ in 0..2 {
            store.record_failed_unlock(caller).await.unwrap();
            assert!(!store.check_and_auto_blacklist(caller).await.unwrap());
        }
        assert!(!store.is_blacklisted(caller).await.unwrap());

        store.record_failed_unlock(caller).await.unwrap();
        assert!(store.check_and_auto_blacklist(caller).await.unwrap());
        assert!(store.is_blacklisted(caller).await.unwrap());

        let entry = &store.blacklist().await.unwrap()[0];
        assert_eq!(entry.reason, AUTO_BLACKLIST_REASON);

        // Already blocked: promotion reports false
        assert!(!store.check_and_auto_blacklist(caller).await.unwrap());
    }

    #[tokio::test]
    async fn test_unblocking_wipes_failure_history() {
        let store = store().await;
        let caller = "015901969502";

        for _ in 0..3 {
            store.record_failed_unlock(caller).await.unwrap();
        }
        store.check_and_auto_blacklist(caller).await.unwrap();
        assert!(store.remove_from_blacklist(caller).await.unwrap());

        assert_eq!(store.failed_unlock_count(caller).await.unwrap(), 0);
        // One new failure is not enough to re-block
        store.record_failed_unlock(caller).await.unwrap();
        assert!(!store.check_and_auto_blacklist(caller).await.unwrap());
    }

    #[tokio::test]
    async fn test_old_failures_age_out_of_window() {
        let store = store().await;
        let caller = "111";

        // Two failures far outside the window, one fresh
        let old = Utc::now() - Duration::hours(FAILED_CALLS_WINDOW_HOURS + 1);
        for _ in 0..2 {
            sqlx::query("INSERT INTO failed_unlock_calls (caller_id, failed_at) VALUES (?, ?)")
                .bind(caller)
                .bind(old)
                .execute(&store.pool)
                .await
                .unwrap();
        }
        store.record_failed_unlock(caller).await.unwrap();

        assert_eq!(store.failed_unlock_count(caller).await.unwrap(), 1);
        assert!(!store.check_and_auto_blacklist(caller).await.unwrap());
    }
}
