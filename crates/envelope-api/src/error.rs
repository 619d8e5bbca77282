use std::fmt;

use axum::http::StatusCode;
use envelope_credentials::CredentialError;
use envelope_types::api::{ErrorResponse, Status};
use envelope_types::errors::ErrorCode;
use thiserror::Error;

/// Severity of a stage failure. Decides whether the pipeline logs, answers
/// and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Caller's fault. Answer and stop, nothing logged.
    Client = 1,
    /// Worth a log line, but the request carries on.
    Warning = 2,
    /// Our fault. Log, answer and stop.
    Server = 3,
}

/// Cause attached to a server error when the request deadline elapsed.
#[derive(Debug, Error)]
#[error("request deadline exceeded")]
pub struct DeadlineExceeded;

/// Error returned by a pipeline stage.
///
/// `cause` is only ever logged; the client sees `code`, `status` and
/// `field`.
#[derive(Debug)]
pub struct TieredError {
    pub level: Level,
    pub status: StatusCode,
    pub code: ErrorCode,
    pub field: Option<&'static str>,
    pub cause: Option<anyhow::Error>,
}

impl TieredError {
    pub fn client(status: StatusCode, code: ErrorCode) -> Self {
        Self {
            level: Level::Client,
            status,
            code,
            field: None,
            cause: None,
        }
    }

    /// A required request field is absent, empty, or names nothing.
    pub fn missing(field: &'static str) -> Self {
        Self::client(StatusCode::BAD_REQUEST, ErrorCode::NotFound).with_field(field)
    }

    pub fn warning(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            level: Level::Warning,
            status: StatusCode::OK,
            code: ErrorCode::Internal,
            field: None,
            cause: Some(cause.into()),
        }
    }

    pub fn server(status: StatusCode, code: ErrorCode, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            level: Level::Server,
            status,
            code,
            field: None,
            cause: Some(cause.into()),
        }
    }

    pub fn internal(cause: impl Into<anyhow::Error>) -> Self {
        Self::server(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal, cause)
    }

    /// Internal error caused by the request deadline. The pipeline rewrites
    /// it to `TIMEOUT` before answering.
    pub fn deadline() -> Self {
        Self::internal(DeadlineExceeded)
    }

    pub fn with_cause(mut self, cause: impl Into<anyhow::Error>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }

    pub fn is_deadline(&self) -> bool {
        self.cause
            .as_ref()
            .is_some_and(|cause| cause.chain().any(|e| e.is::<DeadlineExceeded>()))
    }

    pub(crate) fn into_timeout(mut self) -> Self {
        self.status = StatusCode::REQUEST_TIMEOUT;
        self.code = ErrorCode::Timeout;
        self.field = None;
        self
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            error_code: self.code,
            field: self.field.map(str::to_string),
            status: Status::new(
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("Unknown"),
            ),
        }
    }
}

impl fmt::Display for TieredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.cause, self.field) {
            (Some(cause), _) => write!(f, "{}: {:#}", self.code, cause),
            (None, Some(field)) => write!(f, "{} ({})", self.code, field),
            (None, None) => write!(f, "{}", self.code),
        }
    }
}

impl From<CredentialError> for TieredError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotRegistered => {
                Self::client(StatusCode::UNAUTHORIZED, ErrorCode::NotRegistered)
            }
            CredentialError::Mismatch => Self::client(StatusCode::BAD_REQUEST, ErrorCode::Expired),
            CredentialError::Store(cause) => Self::internal(cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_found_through_context() {
        let err = TieredError::internal(anyhow::Error::new(DeadlineExceeded).context("loading feed"));
        assert!(err.is_deadline());
        assert!(!TieredError::internal(anyhow::anyhow!("disk full")).is_deadline());
        assert!(!TieredError::missing("post").is_deadline());
    }

    #[test]
    fn body_hides_cause() {
        let err = TieredError::internal(anyhow::anyhow!("password=hunter2"));
        let json = serde_json::to_string(&err.body()).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"error_code\":\"INTERNAL_ERROR\""));
        assert!(json.contains("\"status\":\"Internal Server Error\""));
        assert!(json.contains("\"status_code\":500"));
    }

    #[test]
    fn credential_errors_map_to_client_codes() {
        let not_registered = TieredError::from(CredentialError::NotRegistered);
        assert_eq!(not_registered.level, Level::Client);
        assert_eq!(not_registered.status, StatusCode::UNAUTHORIZED);
        assert_eq!(not_registered.code, ErrorCode::NotRegistered);

        let mismatch = TieredError::from(CredentialError::Mismatch);
        assert_eq!(mismatch.code, ErrorCode::Expired);

        let store = TieredError::from(CredentialError::Store(anyhow::anyhow!("down")));
        assert_eq!(store.level, Level::Server);
        assert_eq!(store.code, ErrorCode::Internal);
    }

    #[test]
    fn missing_field_is_named() {
        let json = serde_json::to_value(TieredError::missing("postid").body()).unwrap();
        assert_eq!(json["error_code"], "NOT_FOUND");
        assert_eq!(json["field"], "postid");
        assert_eq!(json["status_code"], 400);
    }
}
