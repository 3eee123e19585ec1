use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request rejected ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response ({status}): {message}")]
    InvalidResponse { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error messages taken from response bodies
const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Synthetic message used when a response body is not valid JSON
pub const UNPARSEABLE_BODY_MESSAGE: &str = "Failed to parse server response";

impl ApiError {
    /// Truncate a server-provided message to avoid logging excessive data
    fn truncate_message(message: &str) -> String {
        if message.len() <= MAX_ERROR_MESSAGE_LENGTH {
            message.to_string()
        } else {
            let cut: String = message.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, message.len())
        }
    }

    /// Message carried by a failed envelope: `error`, then `message`, then a
    /// generic description of the status.
    pub fn message_from_body(status: StatusCode, body: &Value) -> String {
        let field = |name: &str| {
            body.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };
        match field("error").or_else(|| field("message")) {
            Some(message) => Self::truncate_message(message),
            None => format!("Request failed with status {}", status.as_u16()),
        }
    }

    pub fn from_status(status: StatusCode, body: &Value) -> Self {
        let message = Self::message_from_body(status, body);
        match status.as_u16() {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            code @ 500..=599 => ApiError::Server {
                status: code,
                message,
            },
            code => ApiError::Client {
                status: code,
                message,
            },
        }
    }

    /// HTTP status of the failed response. `None` when no response arrived.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized(_) => Some(401),
            ApiError::AccessDenied(_) => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Client { status, .. }
            | ApiError::Server { status, .. }
            | ApiError::InvalidResponse { status, .. } => Some(*status),
            ApiError::Network(_) | ApiError::InvalidRequest(_) => None,
        }
    }

    /// Server-side failures and network failures are presumed transient.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ApiError::Server { .. } | ApiError::Network(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// The message suitable for showing to the user
    pub fn message(&self) -> String {
        match self {
            ApiError::Unauthorized(m)
            | ApiError::AccessDenied(m)
            | ApiError::NotFound(m)
            | ApiError::InvalidRequest(m) => m.clone(),
            ApiError::Client { message, .. }
            | ApiError::Server { message, .. }
            | ApiError::InvalidResponse { message, .. } => message.clone(),
            ApiError::Network(e) => e.to_string(),
        }
    }
}
