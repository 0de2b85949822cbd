use crate::auth::{AuthError, AuthResult};

/// Authentication configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub token_ttl_secs: i64,
    pub actor_cookie_name: String,
    pub csrf_cookie_name: String,
    pub cookie_secure: bool,
    pub jwt_secret: String,
    pub jwt_kid: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        let issuer =
            std::env::var("IMPORT_TABLE_JWT_ISSUER").unwrap_or_else(|_| "http://localhost".into());
        let audience =
            std::env::var("IMPORT_TABLE_JWT_AUDIENCE").unwrap_or_else(|_| "import-table".into());
        let token_ttl_secs = std::env::var("IMPORT_TABLE_TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(24 * 60 * 60);
        let actor_cookie_name = std::env::var("IMPORT_TABLE_ACTOR_COOKIE")
            .unwrap_or_else(|_| "import_actor".into());
        let csrf_cookie_name =
            std::env::var("IMPORT_TABLE_CSRF_COOKIE").unwrap_or_else(|_| "import_csrftoken".into());
        let cookie_secure = std::env::var("IMPORT_TABLE_COOKIE_SECURE")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "on"))
            .unwrap_or(false);
        let jwt_secret = std::env::var("IMPORT_TABLE_JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| AuthError::Config("IMPORT_TABLE_JWT_SECRET is required".into()))?;
        let jwt_kid = std::env::var("IMPORT_TABLE_JWT_KID").ok();

        Ok(Self {
            issuer,
            audience,
            token_ttl_secs,
            actor_cookie_name,
            csrf_cookie_name,
            cookie_secure,
            jwt_secret,
            jwt_kid,
        })
    }

    /// Configuration with fixed names and the given secret, for tests and tools.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            issuer: "http://localhost".into(),
            audience: "import-table".into(),
            token_ttl_secs: 24 * 60 * 60,
            actor_cookie_name: "import_actor".into(),
            csrf_cookie_name: "import_csrftoken".into(),
            cookie_secure: false,
            jwt_secret: secret.into(),
            jwt_kid: None,
        }
    }
}
