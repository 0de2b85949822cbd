use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::importer::ImportState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// A persisted import continuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: i64,
    pub database_name: String,
    pub table_name: String,
    pub source_url: String,
    pub state: ImportState,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: i64,
    database_name: String,
    table_name: String,
    source_url: String,
    state: String,
    status: JobStatus,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for ImportJob {
    type Error = sqlx::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state: ImportState = serde_json::from_str(&row.state).map_err(|err| {
            sqlx::Error::Decode(format!("job {} has an unreadable state: {err}", row.id).into())
        })?;

        Ok(ImportJob {
            id: row.id,
            database_name: row.database_name,
            table_name: row.table_name,
            source_url: row.source_url,
            state,
            status: row.status,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, database_name, table_name, source_url, state, status, \
     error_message, created_at, started_at, completed_at, updated_at";

fn encode_state(state: &ImportState) -> Result<String, sqlx::Error> {
    serde_json::to_string(state).map_err(|err| sqlx::Error::Encode(Box::new(err)))
}

/// Job queue stored in the internal database.
#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Enqueue the continuation of an import that has more pages.
    pub async fn enqueue(&self, source_url: &str, state: &ImportState) -> Result<i64, sqlx::Error> {
        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO import_jobs
                   (database_name, table_name, source_url, state, status, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
               RETURNING id"#,
        )
        .bind(&state.database)
        .bind(&state.table_name)
        .bind(source_url)
        .bind(encode_state(state)?)
        .bind(JobStatus::Queued)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    /// Claim the oldest queued job, marking it running.
    pub async fn claim_next(&self) -> Result<Option<ImportJob>, sqlx::Error> {
        let now = Utc::now();
        let sql = format!(
            r#"UPDATE import_jobs
               SET status = 'running', started_at = COALESCE(started_at, ?1), updated_at = ?1
               WHERE id = (
                   SELECT id FROM import_jobs
                   WHERE status = 'queued'
                   ORDER BY created_at ASC, id ASC
                   LIMIT 1
               )
               RETURNING {JOB_COLUMNS}"#
        );
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ImportJob::try_from).transpose()
    }

    /// Persist the state reached after a page.
    pub async fn save_progress(&self, job_id: i64, state: &ImportState) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE import_jobs SET state = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(encode_state(state)?)
            .bind(Utc::now())
            .bind(job_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Put a running job back in the queue with its new state.
    ///
    /// A job cancelled while its page was in flight stays cancelled.
    pub async fn requeue(&self, job_id: i64, state: &ImportState) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs SET status = 'queued', state = ?1, updated_at = ?2 WHERE id = ?3 AND status = 'running'",
        )
        .bind(encode_state(state)?)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a running job complete. Returns false when it was cancelled meanwhile.
    pub async fn complete(&self, job_id: i64, state: &ImportState) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE import_jobs SET status = 'succeeded', state = ?1, completed_at = ?2, updated_at = ?2 WHERE id = ?3 AND status = 'running'",
        )
        .bind(encode_state(state)?)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark a running job failed. Returns false when it was cancelled meanwhile.
    pub async fn fail(&self, job_id: i64, error: &str) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE import_jobs SET status = 'failed', error_message = ?1, completed_at = ?2, updated_at = ?2 WHERE id = ?3 AND status = 'running'",
        )
        .bind(error)
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Cancel a queued or running job. Returns false when it had already finished.
    pub async fn cancel(&self, job_id: i64) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"UPDATE import_jobs
               SET status = 'cancelled', completed_at = ?1, updated_at = ?1,
                   error_message = 'Cancelled by user'
               WHERE id = ?2 AND status IN ('queued', 'running')"#,
        )
        .bind(now)
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Return jobs a previous process left running to the queue.
    pub async fn requeue_interrupted(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE import_jobs SET status = 'queued', updated_at = ?1 WHERE status = 'running'",
        )
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn get(&self, job_id: i64) -> Result<Option<ImportJob>, sqlx::Error> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM import_jobs WHERE id = ?1");
        let row: Option<JobRow> = sqlx::query_as(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ImportJob::try_from).transpose()
    }

    /// Queued and running jobs, oldest first.
    pub async fn list_active(&self) -> Result<Vec<ImportJob>, sqlx::Error> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM import_jobs WHERE status IN ('queued', 'running') ORDER BY created_at ASC, id ASC"
        );
        let rows: Vec<JobRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(ImportJob::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_pool, run_migrations};

    async fn queue() -> JobQueue {
        let pool = open_memory_pool().await.expect("memory pool");
        run_migrations(&pool).await.expect("migrations");
        JobQueue::new(pool)
    }

    fn state(next: Option<&str>) -> ImportState {
        ImportState {
            database: "data".into(),
            table_name: "things".into(),
            done_count: 10,
            expected_count: 30,
            next_url: next.map(String::from),
        }
    }

    #[tokio::test]
    async fn claims_jobs_in_fifo_order() {
        let queue = queue().await;
        let first = queue
            .enqueue("http://a/t", &state(Some("http://a/t.json?_next=1")))
            .await
            .unwrap();
        let second = queue
            .enqueue("http://b/t", &state(Some("http://b/t.json?_next=1")))
            .await
            .unwrap();

        let claimed = queue.claim_next().await.unwrap().expect("first job");
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());
        assert_eq!(claimed.state.done_count, 10);

        let claimed = queue.claim_next().await.unwrap().expect("second job");
        assert_eq!(claimed.id, second);
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn progress_and_completion_are_persisted() {
        let queue = queue().await;
        let id = queue.enqueue("http://a/t", &state(Some("http://a/1"))).await.unwrap();
        queue.claim_next().await.unwrap();

        let mut progressed = state(Some("http://a/2"));
        progressed.done_count = 20;
        queue.save_progress(id, &progressed).await.unwrap();
        assert_eq!(queue.get(id).await.unwrap().unwrap().state, progressed);

        let mut done = state(None);
        done.done_count = 30;
        assert!(queue.complete(id, &done).await.unwrap());

        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(job.status.is_finished());
        assert!(job.completed_at.is_some());
        assert!(job.state.is_complete());
        assert!(queue.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failures_record_the_message() {
        let queue = queue().await;
        let id = queue.enqueue("http://a/t", &state(Some("http://a/1"))).await.unwrap();
        queue.claim_next().await.unwrap();
        assert!(queue.fail(id, "boom").await.unwrap());

        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn cancel_only_affects_unfinished_jobs() {
        let queue = queue().await;
        let id = queue.enqueue("http://a/t", &state(Some("http://a/1"))).await.unwrap();

        assert!(queue.cancel(id).await.unwrap());
        assert_eq!(queue.get(id).await.unwrap().unwrap().status, JobStatus::Cancelled);
        assert!(!queue.cancel(id).await.unwrap());
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn requeue_keeps_cancelled_jobs_cancelled() {
        let queue = queue().await;
        let id = queue.enqueue("http://a/t", &state(Some("http://a/1"))).await.unwrap();
        queue.claim_next().await.unwrap();

        assert!(queue.requeue(id, &state(Some("http://a/2"))).await.unwrap());
        let job = queue.claim_next().await.unwrap().expect("requeued job");
        assert_eq!(job.state.next_url.as_deref(), Some("http://a/2"));

        queue.cancel(id).await.unwrap();
        assert!(!queue.requeue(id, &state(Some("http://a/3"))).await.unwrap());
        assert_eq!(queue.get(id).await.unwrap().unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn finishing_a_cancelled_job_keeps_it_cancelled() {
        let queue = queue().await;
        let done_id = queue.enqueue("http://a/t", &state(Some("http://a/1"))).await.unwrap();
        let failed_id = queue.enqueue("http://b/t", &state(Some("http://b/1"))).await.unwrap();
        queue.claim_next().await.unwrap();
        queue.claim_next().await.unwrap();
        queue.cancel(done_id).await.unwrap();
        queue.cancel(failed_id).await.unwrap();

        assert!(!queue.complete(done_id, &state(None)).await.unwrap());
        assert!(!queue.fail(failed_id, "boom").await.unwrap());

        let done = queue.get(done_id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Cancelled);
        assert_eq!(done.error_message.as_deref(), Some("Cancelled by user"));
        let failed = queue.get(failed_id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Cancelled);
        assert_eq!(failed.error_message.as_deref(), Some("Cancelled by user"));
    }

    #[tokio::test]
    async fn interrupted_jobs_are_requeued() {
        let queue = queue().await;
        let id = queue.enqueue("http://a/t", &state(Some("http://a/1"))).await.unwrap();
        queue.claim_next().await.unwrap();
        assert!(queue.claim_next().await.unwrap().is_none());

        assert_eq!(queue.requeue_interrupted().await.unwrap(), 1);
        let job = queue.claim_next().await.unwrap().expect("requeued job");
        assert_eq!(job.id, id);
    }
}
