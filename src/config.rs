//! Environment-driven runtime configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name and location of the default in-memory database.
pub const MEMORY_DATABASE: &str = ":memory:";

fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or_else(|| Duration::from_millis(default_millis))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Timeouts for fetching pages from a source instance.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl FetchConfig {
    pub fn from_env() -> Self {
        Self {
            request_timeout: env_duration_millis("IMPORT_TABLE_FETCH_TIMEOUT_MS", 30_000),
            connect_timeout: env_duration_millis("IMPORT_TABLE_CONNECT_TIMEOUT_MS", 10_000),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// One configured destination database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSpec {
    pub name: String,
    /// File path, or `:memory:`.
    pub location: String,
}

impl DatabaseSpec {
    pub fn memory() -> Self {
        Self {
            name: MEMORY_DATABASE.to_string(),
            location: MEMORY_DATABASE.to_string(),
        }
    }

    pub fn is_memory(&self) -> bool {
        self.location == MEMORY_DATABASE
    }

    /// Parse `name=path` or a bare path, naming the latter after its file stem.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if entry.is_empty() {
            return None;
        }

        if let Some((name, location)) = entry.split_once('=') {
            let (name, location) = (name.trim(), location.trim());
            if name.is_empty() || location.is_empty() {
                return None;
            }
            return Some(Self {
                name: name.to_string(),
                location: location.to_string(),
            });
        }

        if entry == MEMORY_DATABASE {
            return Some(Self::memory());
        }

        let name = Path::new(entry)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(entry)
            .to_string();
        Some(Self {
            name,
            location: entry.to_string(),
        })
    }
}

/// Destination databases plus the internal job database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub databases: Vec<DatabaseSpec>,
    pub internal: String,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let raw = env_string("IMPORT_TABLE_DATABASES", MEMORY_DATABASE);
        Self::from_parts(&raw, &env_string("IMPORT_TABLE_INTERNAL_DB", MEMORY_DATABASE))
    }

    pub fn from_parts(databases: &str, internal: &str) -> Self {
        let mut parsed: Vec<DatabaseSpec> = Vec::new();
        for spec in databases.split(',').filter_map(DatabaseSpec::parse) {
            if parsed.iter().any(|existing| existing.name == spec.name) {
                log::warn!("ignoring duplicate database name '{}'", spec.name);
                continue;
            }
            parsed.push(spec);
        }
        if parsed.is_empty() {
            parsed.push(DatabaseSpec::memory());
        }

        Self {
            databases: parsed,
            internal: internal.trim().to_string(),
        }
    }

    pub fn internal_path(&self) -> Option<PathBuf> {
        if self.internal.is_empty() || self.internal == MEMORY_DATABASE {
            None
        } else {
            Some(PathBuf::from(&self.internal))
        }
    }
}

/// Background dispatcher settings.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub poll_interval: Duration,
}

impl JobConfig {
    pub fn from_env() -> Self {
        Self {
            poll_interval: env_duration_millis("IMPORT_TABLE_POLL_INTERVAL_MS", 1_000),
        }
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_bare_database_entries() {
        let config = DatabaseConfig::from_parts("data=/tmp/data.db, /var/lib/other.sqlite ,", "");
        assert_eq!(
            config.databases,
            vec![
                DatabaseSpec {
                    name: "data".into(),
                    location: "/tmp/data.db".into()
                },
                DatabaseSpec {
                    name: "other".into(),
                    location: "/var/lib/other.sqlite".into()
                },
            ]
        );
        assert!(config.internal_path().is_none());
    }

    #[test]
    fn defaults_to_memory_database() {
        let config = DatabaseConfig::from_parts("", ":memory:");
        assert_eq!(config.databases, vec![DatabaseSpec::memory()]);
        assert!(config.databases[0].is_memory());
    }

    #[test]
    fn skips_duplicate_names() {
        let config = DatabaseConfig::from_parts("a=/x.db,a=/y.db", "/tmp/internal.db");
        assert_eq!(config.databases.len(), 1);
        assert_eq!(config.databases[0].location, "/x.db");
        assert_eq!(config.internal_path(), Some(PathBuf::from("/tmp/internal.db")));
    }
}
