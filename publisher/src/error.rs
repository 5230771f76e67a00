//! Error types for every stage of talking to YouTube.
//!
//! Each component surfaces its own error enum so that callers can tell a failed consent
//! flow apart from a rejected upload or a half-finished live setup. Only
//! [`TransportError`] is ever retried, and only inside the upload engine.

use crate::youtube_api::types::ApiErrorResponse;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to persist the credential cache.
///
/// Loading never produces an error: a missing or corrupt cache simply reads as "no
/// credential".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("write credential cache {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize credential")]
    Encode(#[from] serde_json::Error),
}

/// Failure to produce an authenticated API handle.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("read client identity file {}: {reason}", path.display())]
    ClientIdentity { path: PathBuf, reason: String },
    #[error("invalid OAuth endpoint {url}")]
    Endpoint {
        url: String,
        #[source]
        source: oauth2::url::ParseError,
    },
    #[error("run local OAuth callback listener")]
    Listener(#[source] std::io::Error),
    #[error("authorization was declined: {0}")]
    ConsentDenied(String),
    #[error("consent flow ended before an authorization code arrived")]
    ConsentAborted,
    #[error("exchange authorization code for tokens: {0}")]
    CodeExchange(String),
    #[error("refresh access token: {0}")]
    Refresh(String),
    #[error("persist refreshed credential")]
    Persist(#[from] StoreError),
}

/// A network-level failure that may succeed when retried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with transient status {status}")]
    Status { url: String, status: u16 },
}

/// A structured rejection from the platform (validation, quota, permission, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ApiError {
    /// HTTP status of the rejection.
    pub status: u16,
    /// Human-readable message from the platform.
    pub message: String,
    /// Machine-readable reason of the first reported error, e.g. `quotaExceeded`.
    pub reason: Option<String>,
}

impl ApiError {
    /// Builds an error from a non-success response body.
    ///
    /// Falls back to the raw body when it is not Google's JSON error envelope.
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(envelope) => {
                let reason = envelope
                    .error
                    .errors
                    .into_iter()
                    .find_map(|detail| detail.reason);
                Self {
                    status,
                    message: envelope.error.message,
                    reason,
                }
            }
            Err(_) => Self {
                status,
                message: if body.trim().is_empty() {
                    "no error details".to_string()
                } else {
                    body.trim().to_string()
                },
                reason: None,
            },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "YouTube API error {}: {}", self.status, self.message)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

/// Outcome of a single failed API call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("decode {what} response")]
    Decode {
        what: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from YouTube: {0}")]
    Protocol(String),
}

impl CallError {
    /// Whether repeating the same call could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Terminal failure of an upload job.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("read upload source {}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("upload source {} is empty", path.display())]
    EmptySource { path: PathBuf },
    #[error("YouTube rejected the upload after {bytes_sent} bytes")]
    Rejected {
        bytes_sent: u64,
        #[source]
        source: ApiError,
    },
    #[error("upload gave up after {attempts} attempts with {bytes_sent} bytes acknowledged")]
    RetriesExhausted {
        attempts: u32,
        bytes_sent: u64,
        #[source]
        source: TransportError,
    },
    #[error("upload protocol violation after {bytes_sent} bytes: {reason}")]
    Protocol { bytes_sent: u64, reason: String },
}

/// The step of the live provisioning sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionStep {
    StreamCreation,
    BroadcastCreation,
    Binding,
    IngestExtraction,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StreamCreation => write!(f, "stream creation"),
            Self::BroadcastCreation => write!(f, "broadcast creation"),
            Self::Binding => write!(f, "binding"),
            Self::IngestExtraction => write!(f, "ingest extraction"),
        }
    }
}

/// Why a provisioning step failed.
#[derive(Debug, Error)]
pub enum ProvisionCause {
    #[error(transparent)]
    Call(#[from] CallError),
    #[error("stream {0} carries no ingestion info")]
    MissingIngestionInfo(String),
}

/// A failed live provisioning sequence.
///
/// Resources created before the failing step are left in place on the platform; their
/// IDs are kept here so the user can clean them up.
#[derive(Debug, Error)]
#[error("live provisioning failed during {step}{}", LeftBehind(.stream_id, .broadcast_id))]
pub struct ProvisionError {
    pub step: ProvisionStep,
    pub stream_id: Option<String>,
    pub broadcast_id: Option<String>,
    #[source]
    pub source: ProvisionCause,
}

struct LeftBehind<'a>(&'a Option<String>, &'a Option<String>);

impl fmt::Display for LeftBehind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.0, self.1) {
            (None, None) => Ok(()),
            (Some(s), None) => write!(f, " (stream {s} was left in place)"),
            (None, Some(b)) => write!(f, " (broadcast {b} was left in place)"),
            (Some(s), Some(b)) => {
                write!(f, " (stream {s} and broadcast {b} were left in place)")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn api_error_from_google_envelope() {
        let body = r#"{
            "error": {
                "code": 400,
                "message": "The request metadata specifies an invalid or empty video title.",
                "errors": [{
                    "message": "The request metadata specifies an invalid or empty video title.",
                    "domain": "youtube.video",
                    "reason": "invalidTitle"
                }]
            }
        }"#;
        let err = ApiError::from_body(400, body);
        assert_eq!(err.status, 400);
        assert_eq!(err.reason.as_deref(), Some("invalidTitle"));
        assert_eq!(
            err.to_string(),
            "YouTube API error 400: The request metadata specifies an invalid or empty video title. (invalidTitle)"
        );
    }

    #[test]
    fn api_error_from_plain_body() {
        let err = ApiError::from_body(403, "  forbidden\n");
        assert_eq!(err.message, "forbidden");
        assert_eq!(err.reason, None);

        let err = ApiError::from_body(404, "");
        assert_eq!(err.message, "no error details");
    }

    #[test]
    fn provision_error_names_step_and_leftovers() {
        let err = ProvisionError {
            step: ProvisionStep::BroadcastCreation,
            stream_id: Some("s1".into()),
            broadcast_id: None,
            source: ProvisionCause::Call(CallError::Api(ApiError {
                status: 403,
                message: "live streaming is not enabled".into(),
                reason: Some("liveStreamingNotEnabled".into()),
            })),
        };
        assert_eq!(
            err.to_string(),
            "live provisioning failed during broadcast creation (stream s1 was left in place)"
        );
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        let transient = CallError::Transport(TransportError::Status {
            url: "https://example.invalid".into(),
            status: 503,
        });
        assert!(transient.is_retryable());
        assert!(!CallError::Protocol("missing Location".into()).is_retryable());
        assert!(!CallError::Api(ApiError::from_body(400, "")).is_retryable());
    }
}
