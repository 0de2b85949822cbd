//! HTTP route handlers.
//!
//! - `import_table`: the HTML import form
//! - `jobs`: JSON views of queued imports and table progress
//! - `health`: readiness probe

pub mod health;
pub mod import_table;
pub mod jobs;

use rocket::Route;

/// Every route the service mounts at `/`.
pub fn all() -> Vec<Route> {
    routes![
        health::health_check,
        import_table::import_table_form,
        import_table::start_import,
        jobs::list_jobs,
        jobs::get_job,
        jobs::cancel_job,
        jobs::table_progress,
    ]
}
