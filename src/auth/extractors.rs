use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, state::AppState, users::repo_types::User};

/// The authenticated caller, re-read from the store on every request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
}

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.user.is_admin() {
            Ok(())
        } else {
            warn!(user_id = %self.user.id, "admin required");
            Err(AppError::forbidden())
        }
    }

    pub fn require_owner_or_admin(&self, owner_id: Uuid) -> Result<(), AppError> {
        if self.user.id == owner_id || self.user.is_admin() {
            Ok(())
        } else {
            warn!(user_id = %self.user.id, %owner_id, "not owner or admin");
            Err(AppError::forbidden())
        }
    }
}

/// Extracts the bearer token from an `Authorization` header value.
fn bearer_token(header: Option<&str>) -> Result<&str, AppError> {
    let header = header.ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("Invalid Authorization header"))?;
    Ok(token)
}

pub async fn authenticate(state: &AppState, header: Option<&str>) -> Result<AuthUser, AppError> {
    let token = bearer_token(header)?;

    let claims = match state.jwt.verify(token) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "invalid or expired token");
            return Err(AppError::unauthorized("Invalid or expired token"));
        }
    };

    let Some(user) = state.users.find_by_id(claims.sub).await? else {
        warn!(user_id = %claims.sub, "token for missing user");
        return Err(AppError::unauthorized("User no longer exists"));
    };

    Ok(AuthUser { user })
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        authenticate(state, header).await
    }
}

/// An [`AuthUser`] whose role is admin.
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caller = AuthUser::from_request_parts(parts, state).await?;
        caller.require_admin()?;
        Ok(AdminUser(caller))
    }
}
