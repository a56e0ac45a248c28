use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - access credential expired or missing")]
    Unauthorized,

    #[error("Validation failed: {}", format_field_errors(.0))]
    Validation(HashMap<String, String>),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape returned by the backend on 4xx responses.
/// `errors` carries per-field messages for form validation failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<HashMap<String, String>>,
}

fn format_field_errors(fields: &HashMap<String, String>) -> String {
    let mut parts: Vec<String> = fields
        .iter()
        .map(|(field, message)| format!("{}: {}", field, message))
        .collect();
    parts.sort();
    parts.join(", ")
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            400 | 422 => Self::from_client_error_body(body),
            404 => ApiError::NotFound(Self::truncate_body(body)),
            500..=599 => ApiError::ServerError(Self::truncate_body(body)),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, Self::truncate_body(body))),
        }
    }

    /// Parse a 400/422 body into a field error map when the backend
    /// provides one, falling back to the free-text message.
    fn from_client_error_body(body: &str) -> Self {
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
            if let Some(errors) = parsed.errors {
                if !errors.is_empty() {
                    return ApiError::Validation(errors);
                }
            }
            if let Some(message) = parsed.message {
                return ApiError::InvalidResponse(message);
            }
        }
        ApiError::InvalidResponse(Self::truncate_body(body))
    }

    /// Whether this error means the session is gone and route guards
    /// should redirect to the login surface.
    pub fn is_session_loss(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }
}
