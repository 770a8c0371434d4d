use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::users::store::StoreError;

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            status: "success",
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: Some(message.into()),
            data: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidToken(String),
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("dependency failure: {0:#}")]
    DependencyFailure(anyhow::Error),
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

/// Full error text for a 5xx response, attached as a response extension so a
/// development-only layer can surface it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

pub const GENERIC_SERVER_MESSAGE: &str = "Something went wrong, please try again later";

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::Conflict(_)
            | AppError::InvalidToken(_)
            | AppError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DependencyFailure(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("You do not have permission to perform this action".into())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(field) => AppError::Conflict(format!("{} already in use", field)),
            other => AppError::DependencyFailure(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, detail) = if status.is_server_error() {
            error!(error = %self, %status, "request failed");
            (GENERIC_SERVER_MESSAGE.to_string(), Some(self.to_string()))
        } else {
            (self.to_string(), None)
        };

        let body = ApiResponse::<()> {
            status: "error",
            message: Some(message),
            data: None,
        };
        let mut res = (status, Json(body)).into_response();
        if let Some(d) = detail {
            res.extensions_mut().insert(ErrorDetail(d));
        }
        res
    }
}

/// Rewrites 5xx bodies to include the underlying error. Only mounted in
/// development.
pub async fn expose_error_detail(res: Response) -> Response {
    let Some(ErrorDetail(detail)) = res.extensions().get::<ErrorDetail>().cloned() else {
        return res;
    };
    let status = res.status();
    let body = ApiResponse::<()> {
        status: "error",
        message: Some(detail),
        data: None,
    };
    (status, Json(body)).into_response()
}
