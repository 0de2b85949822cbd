//! Paginated table importer.
//!
//! An import starts with one synchronous page fetch that fixes the
//! destination table name and the expected row count, then continues one
//! page at a time by following the source's `next_url` chain until it runs
//! out. Pages are always applied in the order the source hands them out.
//!
//! - `source`: URL validation and normalization
//! - `client`: outbound page fetches
//! - `page`: the listing wire format
//! - `destination`: table creation and upserts
//! - `state`: the resumable progress record

pub mod client;
pub mod destination;
pub mod error;
pub mod page;
pub mod source;
pub mod state;

pub use client::SourceClient;
pub use destination::Destination;
pub use error::{ImportError, ImportResult};
pub use page::{Page, Row};
pub use state::ImportState;

use url::Url;

use crate::auth::Actor;

#[derive(Clone)]
pub struct Importer {
    client: SourceClient,
}

impl Importer {
    pub fn new(client: SourceClient) -> Self {
        Self { client }
    }

    /// Fetch and apply the first page of `source_url` into `destination`.
    ///
    /// Returns once the first page is committed; the remaining pages are
    /// left to [`Importer::continue_import`].
    pub async fn start_import(
        &self,
        actor: &Actor,
        source_url: &str,
        destination: &Destination,
    ) -> ImportResult<ImportState> {
        if !actor.can_import_tables() {
            log::warn!("actor '{}' may not import tables", actor.id);
            return Err(ImportError::Forbidden);
        }

        let url = source::normalize_source_url(source_url)?;
        log::info!(
            "actor '{}' importing {} into database '{}'",
            actor.id,
            url,
            destination.name()
        );

        let page = self.client.fetch_page(&url).await?;
        let next_url = next_url_of(&url, &page)?;

        destination
            .write_page(&page.table_name, &page.rows, &page.primary_keys)
            .await?;

        let expected_count = page.expected_count();
        let done_count = page.row_count();
        let state = ImportState {
            database: destination.name().to_string(),
            table_name: page.table_name,
            done_count,
            expected_count,
            next_url,
        };
        log_progress(&state);

        Ok(state)
    }

    /// Fetch and apply the page at `state.next_url`.
    ///
    /// A complete state is returned unchanged. On error nothing from the
    /// failing page is committed and `state` still points at it.
    pub async fn continue_import(
        &self,
        state: ImportState,
        destination: &Destination,
    ) -> ImportResult<ImportState> {
        let Some(next) = state.next_url.as_deref() else {
            return Ok(state);
        };

        let url = Url::parse(next).map_err(|err| ImportError::format(next, err.to_string()))?;
        let page = self.client.fetch_page(&url).await?;
        if page.table_name != state.table_name {
            log::warn!(
                "page {} names table '{}', keeping '{}'",
                url,
                page.table_name,
                state.table_name
            );
        }
        let next_url = next_url_of(&url, &page)?;

        let written = destination
            .write_page(&state.table_name, &page.rows, &page.primary_keys)
            .await?;

        let state = ImportState {
            done_count: state.done_count + written,
            next_url,
            ..state
        };
        log_progress(&state);

        Ok(state)
    }

    /// Apply every remaining page, one after the other.
    pub async fn run_to_completion(
        &self,
        mut state: ImportState,
        destination: &Destination,
    ) -> ImportResult<ImportState> {
        while !state.is_complete() {
            state = self.continue_import(state, destination).await?;
        }
        Ok(state)
    }
}

fn next_url_of(page_url: &Url, page: &Page) -> ImportResult<Option<String>> {
    page.next_url
        .as_deref()
        .filter(|next| !next.is_empty())
        .map(|next| source::resolve_next_url(page_url, next).map(String::from))
        .transpose()
}

fn log_progress(state: &ImportState) {
    log::info!(
        "import {}/{}: {} of {} rows{}",
        state.database,
        state.table_name,
        state.done_count,
        state.expected_count,
        if state.is_complete() { ", done" } else { "" }
    );
}
