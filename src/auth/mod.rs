//! Authentication module: configuration, actor tokens, CSRF tokens, and
//! Rocket request guards.

use std::sync::Arc;

pub mod config;
pub mod csrf;
pub mod error;
pub mod guards;
pub mod jwt;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use guards::{Actor, IMPORT_TABLE_PERMISSION, ROOT_ACTOR_ID, RequireImportTable};
pub use jwt::JwtService;

#[derive(Clone)]
pub struct AuthState {
    pub config: AuthConfig,
    pub jwt_service: Arc<JwtService>,
}

impl AuthState {
    pub fn new(config: AuthConfig, jwt_service: JwtService) -> Self {
        Self {
            config,
            jwt_service: Arc::new(jwt_service),
        }
    }

    pub fn from_config(config: AuthConfig) -> AuthResult<Self> {
        let jwt_service = JwtService::from_config(&config)?;
        Ok(Self::new(config, jwt_service))
    }
}
