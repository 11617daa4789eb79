use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Classified failure codes understood across the app. Anything the server
/// sends that is not listed here is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Unauthorized,
    DbConnection,
    Network,
    InvalidArgument,
    DuplicateNote,
    Timeout,
    Other(String),
}

impl ErrorCode {
    /// Maps a server `errorCode` (or the `HTTP_<status>` fallback).
    pub fn from_wire(code: &str) -> Self {
        match code {
            "UNAUTHORIZED" | "HTTP_401" => ErrorCode::Unauthorized,
            "DB_CONNECTION_ERROR" | "HTTP_500" => ErrorCode::DbConnection,
            "NETWORK_ERROR" => ErrorCode::Network,
            "INVALID_ARGUMENT" | "HTTP_400" => ErrorCode::InvalidArgument,
            "DUPLICATE_NOTE" => ErrorCode::DuplicateNote,
            "TIMEOUT" => ErrorCode::Timeout,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::DbConnection => "DB_CONNECTION_ERROR",
            ErrorCode::Network => "NETWORK_ERROR",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::DuplicateNote => "DUPLICATE_NOTE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed call to the notes API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} (status {status}): {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// HTTP status, 0 when no response arrived.
    pub status: u16,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, status: u16) -> Self {
        Self {
            code,
            message: message.into(),
            status,
        }
    }

    /// Builds the error for a non-success response from its raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = if body.trim().is_empty() {
            Ok(ErrorBody::default())
        } else {
            serde_json::from_str::<ErrorBody>(body)
        };
        let body = parsed.unwrap_or_else(|_| ErrorBody {
            error: Some("Invalid server response".into()),
            ..ErrorBody::default()
        });

        let code = body
            .error_code
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| format!("HTTP_{status}"));
        let message = body
            .error
            .or(body.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("request failed with status {status}"));
        Self::new(ErrorCode::from_wire(&code), message, status)
    }

    pub fn transport(timeout: bool, message: impl Into<String>) -> Self {
        let code = if timeout {
            ErrorCode::Timeout
        } else {
            ErrorCode::Network
        };
        Self::new(code, message, 0)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Other("INVALID_RESPONSE".into()), message, 200)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == ErrorCode::Unauthorized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_server_code_and_message() {
        let e = ApiError::from_response(409, r#"{"errorCode":"DUPLICATE_NOTE","error":"exists"}"#);
        assert_eq!(e.code, ErrorCode::DuplicateNote);
        assert_eq!(e.message, "exists");
        assert_eq!(e.status, 409);
        assert_eq!(e.to_string(), "DUPLICATE_NOTE (status 409): exists");
    }

    #[test]
    fn falls_back_to_http_status() {
        let e = ApiError::from_response(401, "");
        assert!(e.is_unauthorized());
        let e = ApiError::from_response(500, r#"{"message":"db down"}"#);
        assert_eq!(e.code, ErrorCode::DbConnection);
        assert_eq!(e.message, "db down");
        let e = ApiError::from_response(400, "{}");
        assert_eq!(e.code, ErrorCode::InvalidArgument);
        let e = ApiError::from_response(418, "{}");
        assert_eq!(e.code, ErrorCode::Other("HTTP_418".into()));
    }

    #[test]
    fn malformed_body() {
        let e = ApiError::from_response(502, "<html>bad gateway</html>");
        assert_eq!(e.code, ErrorCode::Other("HTTP_502".into()));
        assert_eq!(e.message, "Invalid server response");
    }

    #[test]
    fn transport_errors_have_no_status() {
        assert_eq!(ApiError::transport(true, "slow").code, ErrorCode::Timeout);
        let e = ApiError::transport(false, "refused");
        assert_eq!(e.code, ErrorCode::Network);
        assert_eq!(e.status, 0);
    }
}
