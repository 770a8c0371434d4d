use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

use crate::{
    auth::dto::{AuthResponse, LoginRequest, RegisterRequest},
    error::AppError,
    state::AppState,
    users::{
        dto::PublicUser,
        repo_types::{NewUser, Role, User},
    },
};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const RESET_TOKEN_TTL: Duration = Duration::hours(1);
const OPAQUE_TOKEN_LEN: usize = 64;

/// Identical for unknown email and wrong password.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const FORGOT_PASSWORD_ACK: &str =
    "If an account with that email exists, a password reset link has been sent";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_email(email: &str) -> Result<(), AppError> {
    if !is_valid_email(email) {
        return Err(AppError::Validation("Please provide a valid email address".into()));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub(crate) fn validate_name(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Random single-use lookup key for verification and reset links.
pub(crate) fn opaque_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(OPAQUE_TOKEN_LEN)
        .map(char::from)
        .collect()
}

fn session(state: &AppState, user: &User) -> Result<AuthResponse, AppError> {
    let token = state.jwt.sign(user).map_err(|e| {
        error!(error = %e, user_id = %user.id, "jwt sign failed");
        AppError::Internal(e.into())
    })?;
    Ok(AuthResponse {
        user: PublicUser::from(user),
        token,
    })
}

pub async fn register(state: &AppState, payload: RegisterRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    validate_password(&payload.password)?;
    let first_name = validate_name("First name", &payload.first_name)?;
    let last_name = validate_name("Last name", &payload.last_name)?;

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = state.hasher.hash(&payload.password).await?;
    let verification_token = opaque_token();
    // The unique index still backstops a concurrent insert of the same email.
    let user = state
        .users
        .insert(NewUser {
            email,
            password_hash,
            first_name,
            last_name,
            role: Role::User,
            verification_token: Some(verification_token.clone()),
        })
        .await?;
    info!(user_id = %user.id, email = %user.email, "user registered");

    let message = state
        .notifier
        .verification_email(&user.email, &user.first_name, &verification_token);
    if let Err(e) = state.mailer.send(message).await {
        // The record stays; the user can still log in but cannot verify.
        error!(error = %e, user_id = %user.id, "verification email failed");
        return Err(AppError::DependencyFailure(e));
    }

    session(state, &user)
}

pub async fn login(state: &AppState, payload: LoginRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&payload.email);

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    };

    if !state.hasher.verify(&payload.password, &user.password_hash).await {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    }

    info!(user_id = %user.id, verified = user.is_verified, "user logged in");
    session(state, &user)
}

pub async fn verify_email(state: &AppState, token: &str) -> Result<PublicUser, AppError> {
    // Clearing the token in the same write makes the link single-use.
    let Some(user) = state.users.mark_verified(token).await? else {
        return Err(AppError::InvalidToken("Invalid verification token".into()));
    };
    info!(user_id = %user.id, "email verified");
    Ok(PublicUser::from(user))
}

pub async fn forgot_password(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = normalize_email(email);
    let Some(user) = state.users.find_by_email(&email).await? else {
        info!("password reset requested for unknown email");
        return Ok(());
    };

    let token = opaque_token();
    let expires = OffsetDateTime::now_utc() + RESET_TOKEN_TTL;
    let Some(user) = state.users.set_reset_token(user.id, &token, expires).await? else {
        // Deleted between the lookup and the write.
        info!(user_id = %user.id, "password reset requested for removed user");
        return Ok(());
    };
    info!(user_id = %user.id, "password reset requested");

    let message = state.notifier.reset_email(&user.email, &user.first_name, &token);
    // A failure here must look the same to the caller as an unknown email.
    if let Err(e) = state.mailer.send(message).await {
        error!(error = %e, user_id = %user.id, "reset email failed");
    }
    Ok(())
}

pub async fn reset_password(state: &AppState, token: &str, password: &str) -> Result<(), AppError> {
    let now = OffsetDateTime::now_utc();
    if state.users.find_by_reset_token(token, now).await?.is_none() {
        return Err(AppError::InvalidOrExpiredToken);
    }
    validate_password(password)?;

    let password_hash = state.hasher.hash(password).await?;
    // The token is checked again by the write itself, so only one of two
    // concurrent resets with the same token lands.
    let Some(user) = state
        .users
        .consume_reset_token(token, OffsetDateTime::now_utc(), &password_hash)
        .await?
    else {
        return Err(AppError::InvalidOrExpiredToken);
    };
    info!(user_id = %user.id, "password reset");
    Ok(())
}
