use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest},
        extractors::AuthUser,
        services::{self, FORGOT_PASSWORD_ACK},
    },
    error::{ApiResponse, AppError},
    extract::{ApiJson, ApiPath},
    state::AppState,
    users::dto::{PublicUser, UserEnvelope},
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify/:token", get(verify_email))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), AppError> {
    let res = services::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Registration successful. Please check your email to verify your account.",
            res,
        )),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    let res = services::login(&state, payload).await?;
    Ok(Json(ApiResponse::data(res)))
}

#[instrument(skip(state, token))]
pub async fn verify_email(
    State(state): State<AppState>,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<ApiResponse<UserEnvelope>>, AppError> {
    let user = services::verify_email(&state, &token).await?;
    Ok(Json(ApiResponse::with_message(
        "Email verified successfully",
        UserEnvelope { user },
    )))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    services::forgot_password(&state, &payload.email).await?;
    Ok(Json(ApiResponse::message(FORGOT_PASSWORD_ACK)))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    services::reset_password(&state, &payload.token, &payload.password).await?;
    Ok(Json(ApiResponse::message("Password has been reset successfully")))
}

#[instrument(skip(caller), fields(user_id = %caller.id()))]
pub async fn get_me(caller: AuthUser) -> Json<ApiResponse<UserEnvelope>> {
    Json(ApiResponse::data(UserEnvelope {
        user: PublicUser::from(caller.user),
    }))
}
