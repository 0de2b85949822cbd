//! Startup wiring: configuration to managed Rocket state.

use rocket::{Build, Rocket};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthConfig, AuthError, AuthState};
use crate::config::{DatabaseConfig, FetchConfig, JobConfig};
use crate::db::{self, DatabaseRegistry};
use crate::importer::{Importer, SourceClient};
use crate::jobs::{ImportDispatcher, JobQueue};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("auth configuration: {0}")]
    Auth(#[from] AuthError),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Everything the routes and the dispatcher share.
#[derive(Clone)]
pub struct AppState {
    pub registry: DatabaseRegistry,
    pub importer: Importer,
    pub queue: JobQueue,
    pub auth: AuthState,
    pub jobs: JobConfig,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub async fn from_env() -> Result<Self, StartupError> {
        let auth = AuthConfig::from_env()?;
        Self::connect(
            &DatabaseConfig::from_env(),
            &FetchConfig::from_env(),
            auth,
            JobConfig::from_env(),
        )
        .await
    }

    /// Open every configured database, migrate the internal one and return
    /// interrupted jobs to the queue.
    pub async fn connect(
        databases: &DatabaseConfig,
        fetch: &FetchConfig,
        auth: AuthConfig,
        jobs: JobConfig,
    ) -> Result<Self, StartupError> {
        let auth = AuthState::from_config(auth)?;
        let registry = DatabaseRegistry::connect(databases).await?;
        let internal = db::connect_internal(databases).await?;
        let importer = Importer::new(SourceClient::new(fetch)?);

        let queue = JobQueue::new(internal);
        let requeued = queue.requeue_interrupted().await?;
        if requeued > 0 {
            log::info!("returned {} interrupted import jobs to the queue", requeued);
        }

        Ok(Self {
            registry,
            importer,
            queue,
            auth,
            jobs,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn dispatcher(&self) -> ImportDispatcher {
        ImportDispatcher::new(
            self.queue.clone(),
            self.importer.clone(),
            self.registry.clone(),
            self.jobs.poll_interval,
        )
    }

    pub fn manage(self, rocket: Rocket<Build>) -> Rocket<Build> {
        rocket
            .manage(self.registry.clone())
            .manage(self.importer.clone())
            .manage(self.queue.clone())
            .manage(self.auth.clone())
            .manage(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_opens_memory_databases() {
        let databases = DatabaseConfig::from_parts(":memory:", ":memory:");
        let state = AppState::connect(
            &databases,
            &FetchConfig::default(),
            AuthConfig::with_secret("test-secret"),
            JobConfig::default(),
        )
        .await
        .expect("app state");

        assert_eq!(state.registry.names(), vec![":memory:"]);
        assert!(state.queue.list_active().await.unwrap().is_empty());
    }
}
