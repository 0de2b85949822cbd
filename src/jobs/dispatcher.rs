use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::db::DatabaseRegistry;
use crate::importer::{ImportState, Importer};
use crate::jobs::queue::{ImportJob, JobQueue};

/// What one dispatcher step did with the job it claimed.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// A page was applied and the job went back in the queue.
    Progressed(ImportState),
    Succeeded(ImportState),
    Failed(String),
    /// The job was cancelled while its page was in flight.
    Cancelled,
}

/// Drives queued imports to completion, one page per claim.
///
/// There is a single dispatcher per process, so pages of all imports are
/// written strictly one after another.
pub struct ImportDispatcher {
    queue: JobQueue,
    importer: Importer,
    registry: DatabaseRegistry,
    poll_interval: Duration,
}

impl ImportDispatcher {
    pub fn new(
        queue: JobQueue,
        importer: Importer,
        registry: DatabaseRegistry,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            importer,
            registry,
            poll_interval,
        }
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) {
        log::info!("import dispatcher started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    log::error!("dispatcher: job queue error: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        log::info!("import dispatcher stopped");
    }

    /// Claim the oldest queued job and apply its next page.
    ///
    /// Returns `None` when the queue is empty.
    pub async fn run_once(&self) -> Result<Option<JobOutcome>, sqlx::Error> {
        let Some(job) = self.queue.claim_next().await? else {
            return Ok(None);
        };
        log::debug!(
            "dispatcher: claimed job {} for {}/{}",
            job.id,
            job.database_name,
            job.table_name
        );

        let outcome = self.process_job(job).await?;
        Ok(Some(outcome))
    }

    async fn process_job(&self, job: ImportJob) -> Result<JobOutcome, sqlx::Error> {
        let job_id = job.id;

        let Some(destination) = self.registry.get(&job.database_name) else {
            let message = format!("database '{}' is no longer configured", job.database_name);
            log::error!("job {}: {}", job_id, message);
            return self.fail_job(job_id, message).await;
        };

        let state = match self.importer.continue_import(job.state, destination).await {
            Ok(state) => state,
            Err(e) => {
                let message = e.to_string();
                log::error!("job {}: page failed: {}", job_id, message);
                return self.fail_job(job_id, message).await;
            }
        };

        if state.is_complete() {
            if !self.queue.complete(job_id, &state).await? {
                self.queue.save_progress(job_id, &state).await?;
                log::warn!("job {}: cancelled by user before its last page landed", job_id);
                return Ok(JobOutcome::Cancelled);
            }
            log::info!(
                "job {}: imported {} rows into {}/{}",
                job_id,
                state.done_count,
                state.database,
                state.table_name
            );
            return Ok(JobOutcome::Succeeded(state));
        }

        if self.queue.requeue(job_id, &state).await? {
            Ok(JobOutcome::Progressed(state))
        } else {
            self.queue.save_progress(job_id, &state).await?;
            log::warn!("job {}: cancelled by user, stopping", job_id);
            Ok(JobOutcome::Cancelled)
        }
    }

    async fn fail_job(&self, job_id: i64, message: String) -> Result<JobOutcome, sqlx::Error> {
        if self.queue.fail(job_id, &message).await? {
            Ok(JobOutcome::Failed(message))
        } else {
            log::warn!("job {}: cancelled by user, dropping error: {}", job_id, message);
            Ok(JobOutcome::Cancelled)
        }
    }
}
