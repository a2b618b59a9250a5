//! Call Record Operations

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{CallRecord, TranscriptLine};

/// Insert the record for a freshly accepted call
pub async fn create(
    pool: &SqlitePool,
    id: &str,
    caller_id: &str,
    started_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO calls (id, caller_id, started_at, transcript, logs)
        VALUES (?, ?, ?, '[]', '')
        "#,
    )
    .bind(id)
    .bind(caller_id)
    .bind(started_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Seal a call at teardown with its final transcript, logs and cost
pub async fn finalize(
    pool: &SqlitePool,
    id: &str,
    ended_at: DateTime<Utc>,
    duration_seconds: i64,
    cost_cents: f64,
    transcript: &[TranscriptLine],
    logs: &str,
) -> Result<(), sqlx::Error> {
    let transcript_json =
        serde_json::to_string(transcript).unwrap_or_else(|_| "[]".to_string());

    sqlx::query(
        r#"
        UPDATE calls
        SET ended_at = ?, duration_seconds = ?, cost_cents = ?, transcript = ?, logs = ?
        WHERE id = ?
        "#,
    )
    .bind(ended_at)
    .bind(duration_seconds)
    .bind(cost_cents)
    .bind(transcript_json)
    .bind(logs)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<CallRecord>, sqlx::Error> {
    sqlx::query_as::<_, CallRecord>(
        r#"
        SELECT id, caller_id, started_at, ended_at, duration_seconds,
               cost_cents, transcript, logs
        FROM calls
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Recent calls, newest first
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<CallRecord>, sqlx::Error> {
    sqlx::query_as::<_, CallRecord>(
        r#"
        SELECT id, caller_id, started_at, ended_at, duration_seconds,
               cost_cents, transcript, logs
        FROM calls
        ORDER BY started_at DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    #[tokio::test]
    async fn test_create_and_finalize_call() {
        let pool = init_memory_pool().await.unwrap();
        let started = Utc::now();

        create(&pool, "call-1", "015901969502", started).await.unwrap();

        let record = get_by_id(&pool, "call-1").await.unwrap().unwrap();
        assert_eq!(record.caller_id.as_deref(), Some("015901969502"));
        assert!(record.ended_at.is_none());

        let transcript = vec![TranscriptLine {
            role: "user".into(),
            text: "7234".into(),
        }];
        finalize(&pool, "call-1", Utc::now(), 42, 3.5, &transcript, "log line")
            .await
            .unwrap();

        let record = get_by_id(&pool, "call-1").await.unwrap().unwrap();
        assert_eq!(record.duration_seconds, Some(42));
        assert!((record.cost_cents - 3.5).abs() < 1e-9);
        assert_eq!(record.transcript_lines(), transcript);
        assert_eq!(record.logs, "log line");
    }

    #[tokio::test]
    async fn test_list_recent_orders_newest_first() {
        let pool = init_memory_pool().await.unwrap();
        let base = Utc::now();

        create(&pool, "old", "a", base - chrono::Duration::hours(2)).await.unwrap();
        create(&pool, "new", "b", base).await.unwrap();

        let calls = list_recent(&pool, 10).await.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "new");
        assert_eq!(calls[1].id, "old");
    }
}
