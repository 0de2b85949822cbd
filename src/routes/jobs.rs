//! JSON endpoints for queued imports and table progress.

use rocket::State;
use rocket::serde::json::Json;

use crate::auth::RequireImportTable;
use crate::db::DatabaseRegistry;
use crate::error::ApiError;
use crate::jobs::{ImportJob, JobQueue};
use crate::models::{DataResponse, MessageResponse, TableProgress};

/// Queued and running imports, oldest first.
#[get("/-/import-table/jobs")]
pub async fn list_jobs(
    _actor: RequireImportTable,
    queue: &State<JobQueue>,
) -> Result<Json<DataResponse<Vec<ImportJob>>>, ApiError> {
    let jobs = queue.list_active().await?;
    Ok(Json(DataResponse { data: jobs }))
}

#[get("/-/import-table/jobs/<job_id>")]
pub async fn get_job(
    _actor: RequireImportTable,
    job_id: i64,
    queue: &State<JobQueue>,
) -> Result<Json<DataResponse<ImportJob>>, ApiError> {
    let job = queue
        .get(job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))?;
    Ok(Json(DataResponse { data: job }))
}

/// Stop a queued or running import after its current page.
#[post("/-/import-table/jobs/<job_id>/cancel")]
pub async fn cancel_job(
    actor: RequireImportTable,
    job_id: i64,
    queue: &State<JobQueue>,
) -> Result<Json<MessageResponse>, ApiError> {
    let job = queue
        .get(job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job_id)))?;

    if !queue.cancel(job.id).await? {
        return Err(ApiError::Conflict(format!(
            "Job {} already finished with status {:?}",
            job.id, job.status
        )));
    }

    log::info!("actor '{}' cancelled job {}", actor.0.id, job.id);
    Ok(Json(MessageResponse {
        message: format!("Job {} cancelled", job.id),
    }))
}

/// Current row count of a destination table.
#[get("/-/import-table/progress/<database>/<table>")]
pub async fn table_progress(
    _actor: RequireImportTable,
    database: &str,
    table: &str,
    registry: &State<DatabaseRegistry>,
) -> Result<Json<DataResponse<TableProgress>>, ApiError> {
    let destination = registry.resolve(Some(database))?;
    let exists = destination.table_exists(table).await?;
    let row_count = destination.row_count(table).await?;

    Ok(Json(DataResponse {
        data: TableProgress {
            database: destination.name().to_string(),
            table_name: table.to_string(),
            exists,
            row_count,
        },
    }))
}
