#[macro_use]
extern crate rocket;

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod importer;
pub mod jobs;
pub mod models;
pub mod request_logger;
pub mod routes;

use crate::app::AppState;
use crate::request_logger::RequestLogger;
use env_logger::Env;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket};
use std::sync::Once;

static LOGGER: Once = Once::new();

pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(
            Env::default().default_filter_or("info,rocket::server=warn,rocket::request=warn"),
        )
        .init();
    });
}

pub fn rocket() -> Rocket<Build> {
    init_logger();

    rocket::build()
        .attach(RequestLogger)
        // Open databases, run migrations and manage shared state
        .attach(AdHoc::try_on_ignite(
            "Import Table State",
            |rocket| async move {
                match AppState::from_env().await {
                    Ok(state) => {
                        log::info!(
                            "import-table ready with databases: {}",
                            state.registry.names().join(", ")
                        );
                        Ok(state.manage(rocket))
                    }
                    Err(e) => {
                        log::error!("startup failed: {}", e);
                        Err(rocket)
                    }
                }
            },
        ))
        .attach(dispatcher_fairing())
        .attach(shutdown_fairing())
        .mount("/", routes::all())
}

/// Spawn the import dispatcher on liftoff.
pub fn dispatcher_fairing() -> AdHoc {
    AdHoc::on_liftoff("Spawn Import Dispatcher", |rocket| {
        Box::pin(async move {
            if let Some(state) = rocket.state::<AppState>() {
                let dispatcher = state.dispatcher();
                let shutdown = state.shutdown.clone();
                tokio::spawn(async move {
                    log::info!("starting import dispatcher");
                    dispatcher.run(shutdown).await
                });
            } else {
                log::error!("failed to spawn import dispatcher: app state not found");
            }
        })
    })
}

/// Stop the dispatcher when Rocket shuts down.
pub fn shutdown_fairing() -> AdHoc {
    AdHoc::on_shutdown("Stop Import Dispatcher", |rocket| {
        Box::pin(async move {
            if let Some(state) = rocket.state::<AppState>() {
                state.shutdown.cancel();
            }
        })
    })
}

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use rocket::config::LogLevel;
    use rocket::figment::Figment;
    use rocket::local::asynchronous::Client as AsyncClient;
    use rocket::local::blocking::Client;
    use rocket::{Build, Rocket, Route};
    use sqlx::SqlitePool;

    use crate::app::AppState;
    use crate::auth::{AuthConfig, AuthState};
    use crate::config::{DatabaseConfig, FetchConfig, JobConfig};

    pub use database::{TestDatabase, TestDatabaseError};

    /// Secret used to sign actor tokens in tests.
    pub const TEST_JWT_SECRET: &str = "import-table-test-secret";

    /// App state over in-memory databases with the given destination names.
    pub async fn test_app_state(databases: &[&str]) -> AppState {
        let entries: Vec<String> = databases
            .iter()
            .map(|name| format!("{name}=:memory:"))
            .collect();
        let config = DatabaseConfig::from_parts(&entries.join(","), ":memory:");

        AppState::connect(
            &config,
            &FetchConfig::default(),
            AuthConfig::with_secret(TEST_JWT_SECRET),
            JobConfig::default(),
        )
        .await
        .expect("test app state")
    }

    /// Signed actor token carrying `permissions`.
    pub fn actor_token(auth: &AuthState, actor_id: &str, permissions: &[&str]) -> String {
        let permissions: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
        auth.jwt_service
            .issue_actor_token(actor_id, &permissions)
            .expect("token signs")
            .token
    }

    /// Convenience helpers for the internal job database in tests.
    pub struct TestFixtures<'a> {
        pool: &'a SqlitePool,
    }

    impl<'a> TestFixtures<'a> {
        pub fn new(pool: &'a SqlitePool) -> Self {
            Self { pool }
        }

        /// Count jobs with the given status.
        pub async fn count_jobs(&self, status: &str) -> Result<i64, sqlx::Error> {
            sqlx::query_scalar("SELECT COUNT(*) FROM import_jobs WHERE status = ?1")
                .bind(status)
                .fetch_one(self.pool)
                .await
        }

        /// Force a job into `running`, as if a previous process died mid-page.
        pub async fn mark_running(&self, job_id: i64) -> Result<(), sqlx::Error> {
            sqlx::query("UPDATE import_jobs SET status = 'running' WHERE id = ?1")
                .bind(job_id)
                .execute(self.pool)
                .await?;
            Ok(())
        }
    }

    pub mod database {
        use std::path::{Path, PathBuf};

        use sqlx::SqlitePool;
        use tempfile::TempDir;
        use thiserror::Error;

        use crate::db::{open_file_pool, open_memory_pool, MIGRATOR};

        #[derive(Debug, Error)]
        pub enum TestDatabaseError {
            #[error("database error: {0}")]
            Sqlx(#[from] sqlx::Error),
            #[error("migration error: {0}")]
            Migration(#[from] sqlx::migrate::MigrateError),
            #[error("temp dir error: {0}")]
            Io(#[from] std::io::Error),
        }

        /// Migrated internal database for a single test.
        pub struct TestDatabase {
            pool: SqlitePool,
            path: Option<PathBuf>,
            _dir: Option<TempDir>,
        }

        impl TestDatabase {
            /// In-memory database, dropped with the pool.
            pub async fn new() -> Result<Self, TestDatabaseError> {
                let pool = open_memory_pool().await?;
                MIGRATOR.run(&pool).await?;
                Ok(Self {
                    pool,
                    path: None,
                    _dir: None,
                })
            }

            /// File-backed database inside a temporary directory.
            pub async fn on_disk() -> Result<Self, TestDatabaseError> {
                let dir = tempfile::tempdir()?;
                let path = dir.path().join("internal.db");
                let pool = open_file_pool(&path).await?;
                MIGRATOR.run(&pool).await?;
                Ok(Self {
                    pool,
                    path: Some(path),
                    _dir: Some(dir),
                })
            }

            pub fn pool(&self) -> &SqlitePool {
                &self.pool
            }

            pub fn pool_clone(&self) -> SqlitePool {
                self.pool.clone()
            }

            pub fn path(&self) -> Option<&Path> {
                self.path.as_deref()
            }

            /// Re-run migrations to ensure schema freshness (idempotent).
            pub async fn reset(&self) -> Result<(), TestDatabaseError> {
                MIGRATOR.run(&self.pool).await?;
                Ok(())
            }

            pub async fn close(self) {
                self.pool.close().await;
            }
        }
    }

    /// Builder for constructing Rocket instances tailored for integration tests.
    #[derive(Default)]
    pub struct TestRocketBuilder {
        figment: Figment,
        mounts: Vec<(String, Vec<Route>)>,
        state: Option<AppState>,
    }

    impl TestRocketBuilder {
        /// Start a builder with sensible defaults: random port, logging disabled.
        pub fn new() -> Self {
            let figment = rocket::Config::figment()
                .merge(("port", 0))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            Self {
                figment,
                mounts: Vec::new(),
                state: None,
            }
        }

        /// Mount routes under `/`.
        pub fn mount_routes(mut self, routes: Vec<Route>) -> Self {
            self.mounts.push(("/".to_string(), routes));
            self
        }

        /// Manage the shared app state for routes that need it.
        pub fn manage_app_state(mut self, state: AppState) -> Self {
            self.state = Some(state);
            self
        }

        /// Finish building the Rocket instance.
        pub fn build(self) -> Rocket<Build> {
            let mut rocket = rocket::custom(self.figment);

            for (base, routes) in self.mounts {
                rocket = rocket.mount(base, routes);
            }

            if let Some(state) = self.state {
                rocket = state.manage(rocket);
            }

            rocket
        }

        /// Convenience helper to produce a blocking local client.
        pub fn blocking_client(self) -> Client {
            Client::tracked(self.build()).expect("valid Rocket instance")
        }

        /// Convenience helper to produce an asynchronous local client.
        pub async fn async_client(self) -> AsyncClient {
            AsyncClient::tracked(self.build())
                .await
                .expect("valid Rocket instance")
        }
    }
}
