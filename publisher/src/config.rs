//! Runtime configuration.
//!
//! Everything the core needs is carried in an explicit [`Config`] value; the binary fills
//! it from command-line arguments and environment variables.

use crate::retry::RetryPolicy;
use crate::youtube_api::types::PrivacyStatus;
use jiff::SignedDuration;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default location of the credential cache, relative to the working directory.
pub const DEFAULT_CREDENTIAL_CACHE: &str = "token.json";

/// Default location of the OAuth client identity file, relative to the working directory.
pub const DEFAULT_CLIENT_SECRET: &str = "client_secret.json";

/// Resumable chunks must be a multiple of this many bytes (except for the last one).
pub const CHUNK_GRANULARITY: u64 = 256 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub credential_cache: PathBuf,
    pub client_secret: PathBuf,
    /// Launch the user's browser for the consent flow.
    pub open_browser: bool,
    pub upload: UploadConfig,
    pub live: LiveProfile,
    pub endpoints: ApiEndpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credential_cache: PathBuf::from(DEFAULT_CREDENTIAL_CACHE),
            client_secret: PathBuf::from(DEFAULT_CLIENT_SECRET),
            open_browser: true,
            upload: UploadConfig::default(),
            live: LiveProfile::default(),
            endpoints: ApiEndpoints::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    pub chunk_size: ChunkSize,
    pub retry: RetryPolicy,
    /// Sent as `X-Upload-Content-Type` when the upload session is created.
    pub mime_type: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSize::TransportDefault,
            retry: RetryPolicy::default(),
            mime_type: "video/*".to_string(),
        }
    }
}

/// How much of the file each resumable request carries.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSize {
    /// Let the transport decide: the whole remainder is streamed in one request.
    #[default]
    TransportDefault,
    /// Fixed windows of this many bytes.
    Bytes(u64),
}

impl ChunkSize {
    /// Length of the next window, given how many bytes are still unacknowledged.
    pub fn window(self, remaining: u64) -> u64 {
        match self {
            Self::TransportDefault => remaining,
            Self::Bytes(n) => n.min(remaining),
        }
    }
}

impl fmt::Display for ChunkSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransportDefault => write!(f, "-1"),
            Self::Bytes(n) => write!(f, "{n}"),
        }
    }
}

impl FromStr for ChunkSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if matches!(s.to_ascii_lowercase().as_str(), "-1" | "auto" | "default") {
            return Ok(Self::TransportDefault);
        }

        let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
            Some(i) => s.split_at(i),
            None => (s, ""),
        };
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid chunk size '{s}'"))?;
        let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "k" | "kib" => 1024,
            "m" | "mib" => 1024 * 1024,
            other => return Err(format!("unknown chunk size unit '{other}'")),
        };
        let bytes = n
            .checked_mul(multiplier)
            .ok_or_else(|| format!("chunk size '{s}' is too large"))?;

        if bytes == 0 || bytes % CHUNK_GRANULARITY != 0 {
            return Err(format!(
                "chunk size must be a positive multiple of {CHUNK_GRANULARITY} bytes (256 KiB), got {bytes}"
            ));
        }
        Ok(Self::Bytes(bytes))
    }
}

/// Fixed technical profile of provisioned live sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveProfile {
    pub frame_rate: String,
    pub resolution: String,
    pub ingestion_type: String,
    /// How far in the future the broadcast is scheduled to start.
    pub schedule_offset: SignedDuration,
    pub privacy: PrivacyStatus,
}

impl Default for LiveProfile {
    fn default() -> Self {
        Self {
            frame_rate: "30fps".to_string(),
            resolution: "1080p".to_string(),
            ingestion_type: "rtmp".to_string(),
            schedule_offset: SignedDuration::from_mins(5),
            privacy: PrivacyStatus::Public,
        }
    }
}

/// Base URLs of the YouTube Data API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    /// e.g. `https://www.googleapis.com/youtube/v3`
    pub api_base: String,
    /// e.g. `https://www.googleapis.com/upload/youtube/v3`
    pub upload_base: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/youtube/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/youtube/v3".to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Points both API surfaces at one server, e.g. a local mock.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{base}/youtube/v3"),
            upload_base: format!("{base}/upload/youtube/v3"),
        }
    }
}
