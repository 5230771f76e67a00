//! Types shared by all YouTube API resources.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The error envelope Google APIs wrap every rejection in.
///
/// See: <https://developers.google.com/youtube/v3/docs/errors>
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// The HTTP status code, repeated in the body.
    #[serde(default)]
    pub code: u16,
    /// A human-readable description of the error.
    #[serde(default)]
    pub message: String,
    /// Per-cause details; the first `reason` is the most useful one.
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Visibility of a video or broadcast.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#status.privacyStatus>
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrivacyStatus {
    /// Anyone can watch.
    Public,
    /// Only the owner and explicitly authorized viewers can watch.
    #[default]
    Private,
    /// Anyone with the link can watch.
    Unlisted,
}

impl PrivacyStatus {
    pub const ALL: [PrivacyStatus; 3] = [Self::Public, Self::Private, Self::Unlisted];
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Private => write!(f, "private"),
            Self::Unlisted => write!(f, "unlisted"),
        }
    }
}

impl std::str::FromStr for PrivacyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "unlisted" => Ok(Self::Unlisted),
            other => Err(format!(
                "unknown privacy status '{other}' (expected public, private or unlisted)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_status_parses_case_insensitively() {
        assert_eq!("Public".parse(), Ok(PrivacyStatus::Public));
        assert_eq!(" unlisted ".parse(), Ok(PrivacyStatus::Unlisted));
        assert!("secret".parse::<PrivacyStatus>().is_err());
    }

    #[test]
    fn privacy_status_serializes_like_the_api() {
        assert_eq!(
            serde_json::to_string(&PrivacyStatus::Unlisted).unwrap(),
            r#""unlisted""#
        );
    }
}
