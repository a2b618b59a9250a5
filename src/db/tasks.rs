//! Background Task Operations
//!
//! Specialist agents create tasks; the core serves list/get/cancel.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{TaskRecord, TaskStatus};

pub async fn create(
    pool: &SqlitePool,
    agent_name: &str,
    description: &str,
    caller_id: Option<&str>,
) -> Result<TaskRecord, sqlx::Error> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO tasks (id, agent_name, description, status, caller_id, created_at, updated_at)
        VALUES (?, ?, ?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(agent_name)
    .bind(description)
    .bind(caller_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(TaskRecord {
        id,
        agent_name: agent_name.to_string(),
        description: Some(description.to_string()),
        status: TaskStatus::Pending,
        result: None,
        error: None,
        caller_id: caller_id.map(String::from),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_by_id(pool: &SqlitePool, id: &str) -> Result<Option<TaskRecord>, sqlx::Error> {
    sqlx::query_as::<_, TaskRecord>(
        r#"
        SELECT id, agent_name, description, status, result, error, caller_id,
               created_at, updated_at
        FROM tasks
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<TaskRecord>, sqlx::Error> {
    sqlx::query_as::<_, TaskRecord>(
        r#"
        SELECT id, agent_name, description, status, result, error, caller_id,
               created_at, updated_at
        FROM tasks
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Cancel a pending or running task. Returns false when the task does not
/// exist or already finished.
pub async fn cancel(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = 'cancelled', updated_at = ?
        WHERE id = ? AND status IN ('pending', 'running')
        "#,
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    #[tokio::test]
    async fn test_create_list_cancel() {
        let pool = init_memory_pool().await.unwrap();

        let task = create(&pool, "code_agent", "build a parser", Some("caller"))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let all = list(&pool).await.unwrap();
        assert_eq!(all.len(), 1);

        assert!(cancel(&pool, &task.id).await.unwrap());
        let task = get_by_id(&pool, &task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);

        // Cancelling again is a no-op
        assert!(!cancel(&pool, &task.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_unknown_task() {
        let pool = init_memory_pool().await.unwrap();
        assert!(!cancel(&pool, "missing").await.unwrap());
    }
}
