// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session error taxonomy and the error object surfaced to the UI layer.

use serde::Serialize;

/// Error type returned by every session and pipeline operation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Malformed token")]
    MalformedToken,

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session expired")]
    SessionExpired,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Validation error ({status}): {message}")]
    Validation { status: u16, message: String },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Login throttled, retry after {retry_after_ms}ms")]
    Throttled { retry_after_ms: i64 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Error object handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSurface {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub is_network_error: bool,
    pub friendly_message: String,
}

impl SessionError {
    pub const SESSION_EXPIRED_MESSAGE: &'static str =
        "Your session has expired. Please sign in again.";
    pub const NETWORK_MESSAGE: &'static str =
        "Unable to reach the server. Check your connection and try again.";
    pub const PAYLOAD_TOO_LARGE_MESSAGE: &'static str =
        "The file is too large to upload.";
    pub const UNSUPPORTED_MEDIA_MESSAGE: &'static str =
        "This file type is not supported.";

    /// HTTP status associated with the error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SessionError::InvalidCredentials | SessionError::SessionExpired => Some(401),
            SessionError::RefreshFailed(_) => Some(401),
            SessionError::Validation { status, .. } | SessionError::Server { status, .. } => {
                Some(*status)
            }
            SessionError::NotFound(_) => Some(404),
            SessionError::Throttled { .. } => Some(429),
            _ => None,
        }
    }

    /// True when the request never produced a response.
    pub fn is_network_error(&self) -> bool {
        matches!(self, SessionError::NetworkUnavailable(_))
    }

    /// True for errors that end the session (forced logout already happened).
    pub fn is_session_ending(&self) -> bool {
        matches!(
            self,
            SessionError::SessionExpired | SessionError::RefreshFailed(_)
        )
    }

    /// Message suitable for display, derived from status code.
    pub fn friendly_message(&self) -> String {
        match self {
            SessionError::NetworkUnavailable(_) => Self::NETWORK_MESSAGE.to_string(),
            SessionError::SessionExpired | SessionError::RefreshFailed(_) => {
                Self::SESSION_EXPIRED_MESSAGE.to_string()
            }
            SessionError::InvalidCredentials => "Invalid email or password.".to_string(),
            SessionError::MalformedToken => Self::SESSION_EXPIRED_MESSAGE.to_string(),
            SessionError::Validation { status: 413, .. } => {
                Self::PAYLOAD_TOO_LARGE_MESSAGE.to_string()
            }
            SessionError::Validation { status: 415, .. } => {
                Self::UNSUPPORTED_MEDIA_MESSAGE.to_string()
            }
            SessionError::Validation { message, .. } if !message.is_empty() => message.clone(),
            SessionError::Validation { .. } => "The request was rejected.".to_string(),
            SessionError::Server { .. } => {
                "The server encountered a problem. Please try again later.".to_string()
            }
            SessionError::NotFound(_) => "The requested resource was not found.".to_string(),
            SessionError::Throttled { retry_after_ms } => format!(
                "Too many login attempts. Try again in {} seconds.",
                (retry_after_ms + 999) / 1000
            ),
            SessionError::Storage(_) | SessionError::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// Build the UI-facing error object.
    pub fn surface(&self) -> ErrorSurface {
        ErrorSurface {
            status_code: self.status_code(),
            is_network_error: self.is_network_error(),
            friendly_message: self.friendly_message(),
        }
    }

    /// Map a terminal HTTP status and server message onto the taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => SessionError::SessionExpired,
            404 => SessionError::NotFound(message),
            400..=499 => SessionError::Validation { status, message },
            _ => SessionError::Server { status, message },
        }
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friendly_message_by_status() {
        assert_eq!(
            SessionError::from_status(401, String::new()).friendly_message(),
            SessionError::SESSION_EXPIRED_MESSAGE
        );
        assert_eq!(
            SessionError::from_status(413, String::new()).friendly_message(),
            SessionError::PAYLOAD_TOO_LARGE_MESSAGE
        );
        assert_eq!(
            SessionError::from_status(415, String::new()).friendly_message(),
            SessionError::UNSUPPORTED_MEDIA_MESSAGE
        );
        assert_eq!(
            SessionError::NetworkUnavailable("refused".into()).friendly_message(),
            SessionError::NETWORK_MESSAGE
        );
    }

    #[test]
    fn validation_keeps_server_message() {
        let err = SessionError::from_status(409, "Email already registered".into());
        assert_eq!(err.friendly_message(), "Email already registered");
        assert_eq!(err.status_code(), Some(409));
    }

    #[test]
    fn surface_serializes_camel_case() {
        let surface = SessionError::NetworkUnavailable("timeout".into()).surface();
        let json = serde_json::to_value(&surface).unwrap();
        assert_eq!(json["isNetworkError"], true);
        assert!(json.get("statusCode").is_none());
        assert_eq!(json["friendlyMessage"], SessionError::NETWORK_MESSAGE);
    }

    #[test]
    fn throttled_rounds_up_seconds() {
        let err = SessionError::Throttled {
            retry_after_ms: 1500,
        };
        assert!(err.friendly_message().contains("2 seconds"));
    }
}
