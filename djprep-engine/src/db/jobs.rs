//! Job rows: durable state for the Job Scheduler so
//! in-flight and queued work survives a process restart. The scheduler
//! itself owns the in-memory queue; this module is its persistence log.

use crate::model::{JobKey, JobPriority, JobState};
use chrono::{DateTime, Utc};
use djprep_common::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRow {
    pub job_id: Uuid,
    pub key: JobKey,
    pub state: JobState,
    pub priority: JobPriority,
    pub attempt: u32,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn state_str(state: JobState) -> &'static str {
    match state {
        JobState::Enqueued => "enqueued",
        JobState::Running => "running",
        JobState::Complete => "complete",
        JobState::Failed => "failed",
        JobState::Cancelled => "cancelled",
    }
}

fn state_from_str(s: &str) -> JobState {
    match s {
        "running" => JobState::Running,
        "complete" => JobState::Complete,
        "failed" => JobState::Failed,
        "cancelled" => JobState::Cancelled,
        _ => JobState::Enqueued,
    }
}

fn priority_str(priority: JobPriority) -> &'static str {
    match priority {
        JobPriority::ScannerDriven => "scanner_driven",
        JobPriority::ExplicitReanalyze => "explicit_reanalyze",
    }
}

fn priority_from_str(s: &str) -> JobPriority {
    match s {
        "explicit_reanalyze" => JobPriority::ExplicitReanalyze,
        _ => JobPriority::ScannerDriven,
    }
}

pub async fn insert_job(pool: &SqlitePool, job: &JobRow) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO jobs (job_id, content_hash, version, state, priority, attempt, reason, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.job_id.to_string())
    .bind(&job.key.content_hash)
    .bind(job.key.version)
    .bind(state_str(job.state))
    .bind(priority_str(job.priority))
    .bind(job.attempt as i64)
    .bind(&job.reason)
    .bind(job.created_at.to_rfc3339())
    .bind(job.updated_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Transition a job's state, bumping `attempt` and recording a reason.
/// Used both for retry bookkeeping and terminal transitions.
pub async fn update_job_state(
    pool: &SqlitePool,
    job_id: Uuid,
    state: JobState,
    attempt: u32,
    reason: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET state = ?, attempt = ?, reason = ?, updated_at = ? WHERE job_id = ?",
    )
    .bind(state_str(state))
    .bind(attempt as i64)
    .bind(reason)
    .bind(Utc::now().to_rfc3339())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Jobs not yet in a terminal state, in FIFO-within-priority order
/// so a restarted scheduler can rebuild its queue.
pub async fn load_active_jobs(pool: &SqlitePool) -> Result<Vec<JobRow>> {
    let rows = sqlx::query(
        "SELECT * FROM jobs WHERE state IN ('enqueued', 'running') \
         ORDER BY CASE priority WHEN 'explicit_reanalyze' THEN 0 ELSE 1 END, created_at ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(row_to_job).collect()
}

pub async fn get_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<JobRow>> {
    let row = sqlx::query("SELECT * FROM jobs WHERE job_id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(row_to_job).transpose()
}

fn row_to_job(row: sqlx::sqlite::SqliteRow) -> Result<JobRow> {
    let job_id: String = row.get("job_id");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(JobRow {
        job_id: Uuid::parse_str(&job_id)
            .map_err(|e| djprep_common::Error::Internal(e.to_string()))?,
        key: JobKey {
            content_hash: row.get("content_hash"),
            version: row.get("version"),
        },
        state: state_from_str(&row.get::<String, _>("state")),
        priority: priority_from_str(&row.get::<String, _>("priority")),
        attempt: row.get::<i64, _>("attempt") as u32,
        reason: row.get("reason"),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        schema::initialize(&pool).await.unwrap();
        pool
    }

    fn sample(id: Uuid, state: JobState) -> JobRow {
        JobRow {
            job_id: id,
            key: JobKey {
                content_hash: "H1".into(),
                version: 1,
            },
            state,
            priority: JobPriority::ScannerDriven,
            attempt: 0,
            reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn load_active_jobs_excludes_terminal_states() {
        let pool = setup().await;
        let running = Uuid::new_v4();
        let done = Uuid::new_v4();
        insert_job(&pool, &sample(running, JobState::Enqueued)).await.unwrap();
        insert_job(&pool, &sample(done, JobState::Complete)).await.unwrap();

        let active = load_active_jobs(&pool).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].job_id, running);
    }

    #[tokio::test]
    async fn update_job_state_bumps_attempt_and_persists_reason() {
        let pool = setup().await;
        let id = Uuid::new_v4();
        insert_job(&pool, &sample(id, JobState::Enqueued)).await.unwrap();
        update_job_state(&pool, id, JobState::Enqueued, 1, Some("transient: timeout"))
            .await
            .unwrap();

        let job = get_job(&pool, id).await.unwrap().unwrap();
        assert_eq!(job.attempt, 1);
        assert_eq!(job.reason.as_deref(), Some("transient: timeout"));
    }
}
