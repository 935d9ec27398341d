use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Generic body returned for every 5xx; the detail only goes to the log.
pub const INTERNAL_MESSAGE: &str = "An internal error occurred. Please try again later.";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_token() -> Self {
        ApiError::Unauthorized("Missing or invalid access token.".into())
    }

    fn to_error_response(message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            message: message.to_string(),
        })
    }
}

/// Maps a database failure onto the internal-error variant.
pub fn db_error(e: sqlx::Error) -> ApiError {
    ApiError::Internal(format!("db error: {e}"))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(&msg)).into_response()
            }
            ApiError::Forbidden(msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(&msg)).into_response()
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(&msg)).into_response()
            }
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(&msg)).into_response()
            }
            ApiError::Conflict(msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(&msg)).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::to_error_response(INTERNAL_MESSAGE),
                )
                    .into_response()
            }
        }
    }
}
