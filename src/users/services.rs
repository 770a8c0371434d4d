use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{
        extractors::AuthUser,
        services::{normalize_email, validate_email, validate_name, validate_password},
    },
    error::AppError,
    state::AppState,
    users::{
        dto::{ChangePasswordRequest, PublicUser, UpdateUserRequest},
        repo_types::{ProfileUpdate, User},
    },
};

async fn load(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Admin only; the caller is checked by the extractor.
pub async fn list_users(state: &AppState) -> Result<Vec<PublicUser>, AppError> {
    let users = state.users.list().await?;
    Ok(users.iter().map(PublicUser::from).collect())
}

pub async fn get_user(state: &AppState, caller: &AuthUser, id: Uuid) -> Result<PublicUser, AppError> {
    caller.require_owner_or_admin(id)?;
    Ok(PublicUser::from(load(state, id).await?))
}

pub async fn update_user(
    state: &AppState,
    caller: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> Result<PublicUser, AppError> {
    caller.require_owner_or_admin(id)?;

    let mut changes = ProfileUpdate::default();
    if let Some(first_name) = payload.first_name {
        changes.first_name = Some(validate_name("First name", &first_name)?);
    }
    if let Some(last_name) = payload.last_name {
        changes.last_name = Some(validate_name("Last name", &last_name)?);
    }
    if let Some(email) = payload.email {
        let email = normalize_email(&email);
        validate_email(&email)?;
        if let Some(other) = state.users.find_by_email(&email).await? {
            if other.id != id {
                warn!(user_id = %id, "email change to taken address");
                return Err(AppError::Conflict("Email already registered".into()));
            }
        }
        changes.email = Some(email);
    }

    let Some(user) = state.users.update_profile(id, changes).await? else {
        return Err(AppError::NotFound("User not found".into()));
    };
    info!(user_id = %user.id, by = %caller.id(), "user updated");
    Ok(PublicUser::from(user))
}

pub async fn change_password(
    state: &AppState,
    caller: &AuthUser,
    id: Uuid,
    payload: ChangePasswordRequest,
) -> Result<(), AppError> {
    caller.require_owner_or_admin(id)?;
    let user = load(state, id).await?;

    if !state
        .hasher
        .verify(&payload.current_password, &user.password_hash)
        .await
    {
        warn!(user_id = %user.id, "change password with wrong current password");
        return Err(AppError::unauthorized("Current password is incorrect"));
    }
    validate_password(&payload.new_password)?;

    let password_hash = state.hasher.hash(&payload.new_password).await?;
    if state.users.set_password_hash(id, &password_hash).await?.is_none() {
        warn!(user_id = %id, "user removed during password change");
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(user_id = %id, "password changed");
    Ok(())
}

/// Admin only; the caller is checked by the extractor.
pub async fn delete_user(state: &AppState, caller: &AuthUser, id: Uuid) -> Result<(), AppError> {
    if !state.users.delete(id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(user_id = %id, by = %caller.id(), "user deleted");
    Ok(())
}
