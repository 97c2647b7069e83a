use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use super::{cookies::ACCESS_COOKIE, services::SessionManager};
use crate::{error::AppError, users::repo_types::PublicUser};

/// The caller resolved from a valid access token.
pub struct AuthUser(pub PublicUser);

/// Access token from the `accessToken` cookie, else a bearer header.
fn access_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(ACCESS_COOKIE) {
        return Some(cookie.value().to_string());
    }
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(|t| t.trim().to_string())
}

impl SessionManager {
    /// Resolve an access token to the user it names. Read-only.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<PublicUser, AppError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized("Unauthorized request"))?;

        let claims = self.tokens().verify_access(token).map_err(|e| {
            warn!(reason = %e, "access token rejected");
            AppError::unauthorized("Invalid or expired access token")
        })?;

        match self.users().find_by_id(claims.sub).await? {
            Some(user) => Ok(user.into()),
            None => {
                warn!(user_id = %claims.sub, "access token for missing user");
                Err(AppError::unauthorized("Invalid access token"))
            }
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionManager: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionManager::from_ref(state);
        let token = access_token(parts);
        let user = sessions.authenticate(token.as_deref()).await?;
        Ok(AuthUser(user))
    }
}
