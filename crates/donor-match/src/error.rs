use crate::config::ConfigError;
use crate::matching::{MatchingServiceError, RosterImportError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

/// Failures surfaced by the binary: start-up, roster loading and matching requests.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    /// Listener, serve loop and file access failures.
    Io(std::io::Error),
    Roster(RosterImportError),
    Matching(MatchingServiceError),
}

impl AppError {
    fn context(&self) -> &'static str {
        match self {
            AppError::Config(_) => "configuration error",
            AppError::Telemetry(_) => "telemetry error",
            AppError::Io(_) => "io error",
            AppError::Roster(_) => "roster error",
            AppError::Matching(_) => "matching error",
        }
    }

    fn inner(&self) -> &(dyn std::error::Error + 'static) {
        match self {
            AppError::Config(err) => err,
            AppError::Telemetry(err) => err,
            AppError::Io(err) => err,
            AppError::Roster(err) => err,
            AppError::Matching(err) => err,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Roster(_) => StatusCode::BAD_REQUEST,
            AppError::Matching(MatchingServiceError::RecipientNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Matching(MatchingServiceError::Validation(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Matching(MatchingServiceError::Unauthorized) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context(), self.inner())
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

macro_rules! app_error_from {
    ($($source:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$source> for AppError {
                fn from(value: $source) -> Self {
                    Self::$variant(value)
                }
            }
        )+
    };
}

app_error_from! {
    ConfigError => Config,
    TelemetryError => Telemetry,
    std::io::Error => Io,
    RosterImportError => Roster,
    MatchingServiceError => Matching,
}
