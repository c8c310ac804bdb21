//! Module containing various error types.

use std::fmt;
use std::io;

use serde::Deserialize;
use thiserror::Error as ThisError;

use crate::client::SendError;
use crate::config::ConfigError;

/// Error body returned by OAuth token endpoints.
#[derive(Deserialize, Debug)]
pub(crate) struct JsonError {
    pub error: String,
    pub error_description: Option<String>,
}

/// A helper type to deserialize either a JsonError or another piece of data.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum JsonErrorOr<T> {
    Err(JsonError),
    Data(T),
}

impl<T> JsonErrorOr<T> {
    pub(crate) fn into_result(self) -> Result<T, JsonError> {
        match self {
            JsonErrorOr::Err(err) => Result::Err(err),
            JsonErrorOr::Data(value) => Result::Ok(value),
        }
    }
}

/// Everything that can go wrong while obtaining a credential.
#[derive(Debug, ThisError)]
pub enum AuthError {
    /// The secrets or settings could not be used.
    #[error("invalid secrets: {0}")]
    Secrets(#[from] ConfigError),
    /// The token endpoint answered with an OAuth error.
    #[error("{}", format_server_error(.error, .error_description.as_deref()))]
    Server {
        /// OAuth error code, e.g. `invalid_grant`.
        error: String,
        /// Optional human readable description.
        error_description: Option<String>,
    },
    /// The token endpoint answered with something that is not a token.
    #[error("bad token response: {0}")]
    BadServerResponse(String),
    /// The token endpoint failed with a server error, a timeout or throttling.
    #[error("token endpoint unavailable: {0}")]
    Unavailable(String),
    /// The user did not finish the consent flow.
    #[error("consent flow abandoned: {0}")]
    ConsentAbandoned(String),
    /// The cached credential could not be refreshed and interactive consent is disabled.
    #[error("token refresh failed and interactive consent is disabled: {0}")]
    RefreshFailed(Box<AuthError>),
    /// No credential is cached and interactive consent is disabled.
    #[error("no cached credential and interactive consent is disabled")]
    NoCredential,
    /// The service account key could not sign the token request.
    #[error("failed to sign service account assertion: {0}")]
    Signing(String),
    /// Transport failure talking to the token endpoint.
    #[error(transparent)]
    HttpClient(#[from] SendError),
    /// A lower level IO error, e.g. from the token cache or the loopback listener.
    #[error(transparent)]
    LowLevel(#[from] io::Error),
}

fn format_server_error(error: &str, desc: Option<&str>) -> String {
    match desc {
        Some(desc) => format!("{}: {}", error, desc),
        None => error.to_string(),
    }
}

impl AuthError {
    /// True for failures that say nothing about the validity of the credential, so
    /// repeating the request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Unavailable(_) | AuthError::HttpClient(_) => true,
            AuthError::RefreshFailed(inner) => inner.is_transient(),
            _ => false,
        }
    }
}

impl From<JsonError> for AuthError {
    fn from(value: JsonError) -> AuthError {
        AuthError::Server {
            error: value.error,
            error_description: value.error_description,
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(value: serde_json::Error) -> AuthError {
        AuthError::BadServerResponse(value.to_string())
    }
}

/// The kinds of failure an operation can end in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// No credential could be obtained, or the remote rejected it.
    Auth,
    /// The request was incomplete, or the remote rejected its content.
    Validation,
    /// The video id does not resolve.
    NotFound,
    /// The remote service denied permission.
    Forbidden,
    /// Network failure, timeout, server error or unreadable response.
    Transport,
}

impl FailureKind {
    /// Name shown to the user.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Auth => "AuthError",
            FailureKind::Validation => "ValidationError",
            FailureKind::NotFound => "NotFound",
            FailureKind::Forbidden => "Forbidden",
            FailureKind::Transport => "TransportError",
        }
    }

    /// Map an HTTP status of the video API onto a failure kind.
    pub fn from_status(status: http::StatusCode) -> FailureKind {
        match status.as_u16() {
            401 => FailureKind::Auth,
            403 => FailureKind::Forbidden,
            404 => FailureKind::NotFound,
            408 | 429 => FailureKind::Transport,
            400..=499 => FailureKind::Validation,
            _ => FailureKind::Transport,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        self.as_str().fmt(f)
    }
}

/// A failed operation, as surfaced to the user.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{kind}: {message}")]
pub struct Failure {
    /// What went wrong.
    pub kind: FailureKind,
    /// Human readable explanation.
    pub message: String,
}

impl Failure {
    /// Create a failure of the given kind.
    pub fn new<S: Into<String>>(kind: FailureKind, message: S) -> Failure {
        Failure {
            kind,
            message: message.into(),
        }
    }

    /// A required field was missing or malformed.
    pub fn validation<S: Into<String>>(message: S) -> Failure {
        Failure::new(FailureKind::Validation, message)
    }

    /// The video id did not resolve.
    pub fn not_found(video_id: &str) -> Failure {
        Failure::new(FailureKind::NotFound, format!("video '{}' not found", video_id))
    }
}

impl From<AuthError> for Failure {
    fn from(value: AuthError) -> Failure {
        let kind = if value.is_transient() {
            FailureKind::Transport
        } else {
            FailureKind::Auth
        };
        Failure::new(kind, value.to_string())
    }
}

impl From<SendError> for Failure {
    fn from(value: SendError) -> Failure {
        Failure::new(FailureKind::Transport, value.to_string())
    }
}

impl From<serde_json::Error> for Failure {
    fn from(value: serde_json::Error) -> Failure {
        Failure::new(
            FailureKind::Transport,
            format!("unexpected response from the video service: {}", value),
        )
    }
}

impl From<io::Error> for Failure {
    fn from(value: io::Error) -> Failure {
        Failure::new(FailureKind::Validation, format!("cannot read video file: {}", value))
    }
}

/// Google API error envelope: `{"error": {"code": 404, "message": "..."}}`.
#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetail {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorReason {
    reason: Option<String>,
}

/// Convert a non-success response of the video API into a `Failure`.
pub(crate) fn failure_from_response(status: http::StatusCode, body: &[u8]) -> Failure {
    let kind = FailureKind::from_status(status);
    let message = match serde_json::from_slice::<ApiErrorBody>(body) {
        Ok(parsed) => {
            let reason = parsed.error.errors.iter().find_map(|e| e.reason.clone());
            match (parsed.error.message, reason) {
                (Some(msg), Some(reason)) => format!("{} ({})", msg, reason),
                (Some(msg), None) => msg,
                (None, Some(reason)) => reason,
                (None, None) => status.to_string(),
            }
        }
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => format!("{}: {}", status, String::from_utf8_lossy(body)),
    };
    Failure::new(kind, message)
}
