use crate::services::{ratings_repository::RatingsError, selector::SelectError};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Error returned by handlers, rendered as `{ "error": .., "status": .. }`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<SelectError> for AppError {
    fn from(err: SelectError) -> Self {
        tracing::error!(error = %err, "image selection failed");
        AppError::internal("Failed to retrieve images")
    }
}

impl From<RatingsError> for AppError {
    fn from(err: RatingsError) -> Self {
        match err {
            RatingsError::Contention { .. } => {
                tracing::warn!(error = %err, "rating not saved");
                AppError::new(
                    StatusCode::CONFLICT,
                    "Ratings are being updated concurrently, please retry",
                )
            }
            other => {
                tracing::error!(error = %other, "rating not saved");
                AppError::internal("Failed to save rating")
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(format!("Invalid request: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_maps_to_conflict() {
        let err: AppError = RatingsError::Contention {
            key: "ratings.json".into(),
            attempts: 5,
        }
        .into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[test]
    fn renders_status_in_body() {
        let response = AppError::not_found("No unrated images available").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
