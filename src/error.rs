//! Handler-level error taxonomy and its HTTP rendering.

use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::cache::CacheError;
use crate::router::not_found;
use crate::security::LimiterError;
use crate::store::StoreError;
use crate::{Response, StatusCode};

/// Everything a handler can fail with.
///
/// Client-facing variants render as fixed JSON bodies (404 stays plain
/// text). Backend failures render as a generic 500 and are logged.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("rate limit exceeded")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("request body is not valid JSON: {0}")]
    MalformedRequestBody(#[source] serde_json::Error),

    #[error("request body lacks a non-empty `key` or `value`")]
    ValidationFailure,

    #[error("no route matches the request")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Limiter(#[from] LimiterError),

    #[error("failed to serialize response body: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimitExceeded { .. } => StatusCode::TooManyRequests,
            Self::MalformedRequestBody(_) | Self::ValidationFailure => StatusCode::BadRequest,
            Self::NotFound => StatusCode::NotFound,
            Self::Store(_) | Self::Cache(_) | Self::Limiter(_) | Self::Serialize(_) => {
                StatusCode::InternalServerError
            }
        }
    }

    fn body(&self) -> ErrorBody<'static> {
        match self {
            Self::RateLimitExceeded { .. } => ErrorBody {
                error: "Rate limit exceeded",
                message: Some("Too many requests. Please try again later."),
            },
            Self::MalformedRequestBody(_) => ErrorBody {
                error: "Invalid JSON in request body",
                message: None,
            },
            Self::ValidationFailure => ErrorBody {
                error: "Missing required fields",
                message: Some("Request must include \"key\" and \"value\" fields"),
            },
            _ => ErrorBody {
                error: "Internal Server Error",
                message: None,
            },
        }
    }

    /// Renders the error as the response sent to the client.
    pub fn into_response(self) -> Response {
        if matches!(self, Self::NotFound) {
            return not_found();
        }

        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let mut response = match Response::json(status, &self.body()) {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "failed to render error body");
                Response::new(status).body(status.canonical_reason())
            }
        };
        if let Self::RateLimitExceeded { retry_after_secs } = self {
            response.set_header("Retry-After", retry_after_secs.to_string());
        }
        response
    }
}

impl From<AppError> for Response {
    fn from(err: AppError) -> Self {
        err.into_response()
    }
}
