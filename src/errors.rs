use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Errors raised by the field-data pipeline, predictor and log.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Malformed user or location input (bad pincode, out-of-range values,
    /// provider payload that does not match the documented shape).
    Validation(String),
    /// No data for the requested location (soil or weather missing).
    NotFound(String),
    /// Crop name is not supported or has no model artifact.
    UnknownCrop(String),
    /// Network failure talking to the weather provider.
    Transport(String),
    /// Reference table or prediction log could not be read or written.
    Storage(String),
    /// Anything else that is the server's fault.
    Internal(String),
    /// Another error annotated with what was being attempted.
    WithContext {
        /// The wrapped error.
        source: Box<AppError>,
        /// What was being attempted.
        context: String,
    },
}

impl AppError {
    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self.root() {
            AppError::Validation(_) => "validation_error",
            AppError::NotFound(_) => "not_found",
            AppError::UnknownCrop(_) => "unknown_crop",
            AppError::Transport(_) => "transport_error",
            AppError::Storage(_) => "storage_error",
            AppError::Internal(_) | AppError::WithContext { .. } => "internal_error",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::UnknownCrop(crop) => write!(f, "Unknown crop: {}", crop),
            AppError::Transport(msg) => write!(f, "Transport error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and JSON body.
    ///
    /// Server-side failures are logged here; client errors are returned as-is.
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, error_message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::UnknownCrop(crop) => (
                StatusCode::NOT_FOUND,
                format!("No model available for crop '{}'", crop),
            ),
            AppError::Transport(msg) => {
                tracing::error!("Weather provider transport error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "External service error".to_string(),
                )
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error processing the data.".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("{} failed: {}", context, source);
                return source.into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

/// `anyhow::Context`-style annotation for results that convert into `AppError`.
pub trait ResultExt<T> {
    /// Wrap the error with a fixed message.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Wrap the error with a message built only on failure.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<AppError>,
{
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e.into()),
            context: f(),
        })
    }
}
