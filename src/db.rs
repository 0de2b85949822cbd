//! SQLite pools for destination databases and the internal job database.

use std::path::Path;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::{DatabaseConfig, DatabaseSpec};
use crate::importer::{Destination, ImportError, ImportResult};

/// Migrations for the internal job database.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Open an in-memory SQLite pool.
///
/// The pool keeps exactly one connection alive forever; every new
/// connection would otherwise see its own empty database.
pub async fn open_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
}

/// Open (creating if missing) a file-backed SQLite pool in WAL mode.
pub async fn open_file_pool(path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await
}

async fn open_spec(spec: &DatabaseSpec) -> Result<SqlitePool, sqlx::Error> {
    if spec.is_memory() {
        open_memory_pool().await
    } else {
        open_file_pool(Path::new(&spec.location)).await
    }
}

/// Open the internal database and bring its schema up to date.
pub async fn connect_internal(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let pool = match config.internal_path() {
        Some(path) => open_file_pool(&path).await?,
        None => open_memory_pool().await?,
    };
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run internal database migrations. Already applied migrations are skipped.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    log::info!("checking internal database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("internal database migrations up to date");
    Ok(())
}

/// The destination databases the import form can write to.
#[derive(Clone)]
pub struct DatabaseRegistry {
    destinations: Vec<Destination>,
}

impl DatabaseRegistry {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let mut destinations = Vec::with_capacity(config.databases.len());
        for spec in &config.databases {
            let pool = open_spec(spec).await?;
            log::info!("opened database '{}' at {}", spec.name, spec.location);
            destinations.push(Destination::new(spec.name.clone(), pool));
        }
        Ok(Self { destinations })
    }

    pub fn from_destinations(destinations: Vec<Destination>) -> Self {
        Self { destinations }
    }

    pub fn names(&self) -> Vec<&str> {
        self.destinations.iter().map(Destination::name).collect()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Destination> {
        self.destinations.iter().find(|dest| dest.name() == name)
    }

    /// Pick the destination for a form submission, defaulting to the first
    /// configured database.
    pub fn resolve(&self, name: Option<&str>) -> ImportResult<&Destination> {
        match name.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => self
                .get(name)
                .ok_or_else(|| ImportError::UnknownDatabase(name.to_string())),
            None => self.destinations.first().ok_or(ImportError::NoDatabase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry(names: &[&str]) -> DatabaseRegistry {
        let mut destinations = Vec::new();
        for name in names {
            let pool = open_memory_pool().await.expect("memory pool");
            destinations.push(Destination::new(*name, pool));
        }
        DatabaseRegistry::from_destinations(destinations)
    }

    #[tokio::test]
    async fn single_database_is_used_by_default() {
        let registry = registry(&[":memory:"]).await;
        let dest = registry.resolve(None).expect("default destination");
        assert_eq!(dest.name(), ":memory:");
        assert_eq!(registry.resolve(Some("  ")).unwrap().name(), ":memory:");
    }

    #[tokio::test]
    async fn first_database_is_the_default_among_several() {
        let registry = registry(&["a", "b"]).await;
        assert_eq!(registry.resolve(None).unwrap().name(), "a");
        assert_eq!(registry.resolve(Some("b")).unwrap().name(), "b");
        assert!(matches!(
            registry.resolve(Some("c")),
            Err(ImportError::UnknownDatabase(name)) if name == "c"
        ));
    }

    #[tokio::test]
    async fn empty_registry_has_no_default() {
        let registry = DatabaseRegistry::from_destinations(Vec::new());
        assert!(registry.is_empty());
        assert!(matches!(registry.resolve(None), Err(ImportError::NoDatabase)));
    }

    #[tokio::test]
    async fn memory_pool_keeps_its_data() {
        let pool = open_memory_pool().await.unwrap();
        sqlx::query("CREATE TABLE t (x INTEGER)").execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO t VALUES (1)").execute(&pool).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
