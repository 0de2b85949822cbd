use chrono::Utc;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::Request;
use rocket::State;
use serde::Serialize;

use crate::auth::jwt::ActorTokenClaims;
use crate::auth::{AuthError, AuthResult, AuthState};

/// Permission required to use the import form.
pub const IMPORT_TABLE_PERMISSION: &str = "import-table";

/// Actor id that is allowed everything.
pub const ROOT_ACTOR_ID: &str = "root";

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub permissions: Vec<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, permissions: Vec<String>) -> Self {
        Self {
            id: id.into(),
            permissions,
        }
    }

    pub fn root() -> Self {
        Self::new(ROOT_ACTOR_ID, Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ACTOR_ID
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_root() || self.permissions.iter().any(|p| p == permission)
    }

    pub fn can_import_tables(&self) -> bool {
        self.has_permission(IMPORT_TABLE_PERMISSION)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Actor {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match extract_actor(request).await {
            Ok(actor) => Outcome::Success(actor),
            Err(err) => Outcome::Error((err.status(), err)),
        }
    }
}

/// Guard for routes that need the `import-table` permission.
///
/// Every failure, including a missing or invalid token, is reported as 403.
#[derive(Debug, Clone)]
pub struct RequireImportTable(pub Actor);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequireImportTable {
    type Error = AuthError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match Actor::from_request(request).await {
            Outcome::Success(actor) if actor.can_import_tables() => {
                Outcome::Success(RequireImportTable(actor))
            }
            Outcome::Success(actor) => {
                log::debug!("actor '{}' lacks {}", actor.id, IMPORT_TABLE_PERMISSION);
                Outcome::Error((Status::Forbidden, AuthError::Forbidden))
            }
            Outcome::Error((_, err)) => {
                log::debug!("rejecting unauthenticated import request: {}", err);
                Outcome::Error((Status::Forbidden, AuthError::Forbidden))
            }
            Outcome::Forward(_) => Outcome::Error((Status::Forbidden, AuthError::Forbidden)),
        }
    }
}

async fn extract_actor(request: &Request<'_>) -> AuthResult<Actor> {
    let auth_state = request
        .guard::<&State<AuthState>>()
        .await
        .succeeded()
        .ok_or_else(|| AuthError::Config("AuthState missing from state".into()))?;

    let token = token_from_request(request, &auth_state.config.actor_cookie_name)
        .ok_or(AuthError::Unauthorized)?;

    let claims = auth_state.jwt_service.decode_actor_token(&token)?;
    validate_claims(&claims)?;

    Ok(Actor::new(claims.sub, claims.permissions))
}

/// Bearer token from the `Authorization` header, falling back to the actor cookie.
fn token_from_request(request: &Request<'_>, cookie_name: &str) -> Option<String> {
    if let Some(header) = request.headers().get_one("Authorization") {
        let mut parts = header.splitn(2, ' ');
        let scheme = parts.next().unwrap_or_default();
        let token = parts.next().unwrap_or_default().trim();
        if scheme.eq_ignore_ascii_case("Bearer") && !token.is_empty() {
            return Some(token.to_string());
        }
    }

    request
        .cookies()
        .get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn validate_claims(claims: &ActorTokenClaims) -> AuthResult<()> {
    let now = Utc::now().timestamp();
    if claims.exp < now {
        return Err(AuthError::TokenExpired);
    }
    if claims.sub.trim().is_empty() {
        return Err(AuthError::TokenInvalid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_actor_can_import_without_explicit_permission() {
        assert!(Actor::root().can_import_tables());
    }

    #[test]
    fn permission_is_required_for_other_actors() {
        let plain = Actor::new("bob", vec!["view".into()]);
        assert!(!plain.can_import_tables());

        let importer = Actor::new("carol", vec![IMPORT_TABLE_PERMISSION.into()]);
        assert!(importer.can_import_tables());
    }
}
