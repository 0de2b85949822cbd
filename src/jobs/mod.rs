//! Background continuation of multi-page imports.
//!
//! The import form commits the first page itself and enqueues the rest;
//! the dispatcher picks queued jobs up in creation order and applies their
//! remaining pages, persisting progress after every page.

pub mod dispatcher;
pub mod queue;

pub use dispatcher::{ImportDispatcher, JobOutcome};
pub use queue::{ImportJob, JobQueue, JobStatus};
