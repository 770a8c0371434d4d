use axum::{
    extract::State,
    routing::{get, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::extractors::{AdminUser, AuthUser},
    error::{ApiResponse, AppError},
    extract::{ApiJson, ApiPath},
    state::AppState,
    users::{
        dto::{ChangePasswordRequest, UpdateUserRequest, UserEnvelope, UserList},
        services,
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/users/:id/change-password", put(change_password))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<ApiResponse<UserList>>, AppError> {
    let users = services::list_users(&state).await?;
    Ok(Json(ApiResponse::data(UserList {
        count: users.len(),
        users,
    })))
}

#[instrument(skip(state, caller))]
pub async fn get_user(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<UserEnvelope>>, AppError> {
    let user = services::get_user(&state, &caller, id).await?;
    Ok(Json(ApiResponse::data(UserEnvelope { user })))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserEnvelope>>, AppError> {
    let user = services::update_user(&state, &caller, id, payload).await?;
    Ok(Json(ApiResponse::with_message(
        "User updated successfully",
        UserEnvelope { user },
    )))
}

#[instrument(skip(state, caller, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    caller: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    services::change_password(&state, &caller, id, payload).await?;
    Ok(Json(ApiResponse::message("Password changed successfully")))
}

#[instrument(skip(state, admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    services::delete_user(&state, &admin, id).await?;
    Ok(Json(ApiResponse::message("User deleted successfully")))
}
