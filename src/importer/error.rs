use reqwest::StatusCode;
use rocket::http::Status;
use thiserror::Error;

pub type ImportResult<T> = Result<T, ImportError>;

/// Errors raised while starting or continuing a table import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("you do not have permission to import tables")]
    Forbidden,
    #[error("invalid source URL '{url}': {reason}")]
    InvalidSourceUrl { url: String, reason: String },
    #[error("unknown database '{0}'")]
    UnknownDatabase(String),
    #[error("no database is configured to import into")]
    NoDatabase,
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}: {body}")]
    FetchStatus {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("unexpected response from {url}: {reason}")]
    Format { url: String, reason: String },
    #[error("failed to write table '{table}': {source}")]
    DestinationWrite {
        table: String,
        #[source]
        source: sqlx::Error,
    },
}

impl ImportError {
    pub fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        ImportError::InvalidSourceUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn format(url: &str, reason: impl Into<String>) -> Self {
        ImportError::Format {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn write(table: &str, source: sqlx::Error) -> Self {
        ImportError::DestinationWrite {
            table: table.to_string(),
            source,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            ImportError::Forbidden => Status::Forbidden,
            ImportError::InvalidSourceUrl { .. }
            | ImportError::UnknownDatabase(_)
            | ImportError::Format { .. } => Status::BadRequest,
            ImportError::Fetch { .. } | ImportError::FetchStatus { .. } => Status::BadGateway,
            ImportError::NoDatabase | ImportError::DestinationWrite { .. } => {
                Status::InternalServerError
            }
        }
    }
}
