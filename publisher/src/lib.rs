//! Authenticate once with YouTube, then upload videos with resumable chunked transfer or
//! provision live sessions.
//!
//! The pieces, from the bottom up:
//!
//! - [`CredentialStore`] keeps the OAuth credential on disk between runs.
//! - [`AuthSessionManager`] turns that cache into an authenticated [`YouTubeClient`],
//!   refreshing silently or asking the user to consent as needed.
//! - [`ResumableUploader`] drives an [`UploadJob`] to completion, surviving transient
//!   network failures.
//! - [`LiveProvisioner`] creates an ingest stream and a broadcast, binds them, and hands
//!   back the ingest URL and stream key.

pub mod config;
pub mod credentials;
pub mod error;
pub mod live;
pub mod oauth;
pub mod retry;
pub mod session;
pub mod upload;
pub mod youtube_api;

pub use config::{ApiEndpoints, ChunkSize, Config, LiveProfile, UploadConfig};
pub use credentials::{Credential, CredentialStore};
pub use error::{
    ApiError, AuthError, CallError, ProvisionError, ProvisionStep, StoreError, TransportError,
    UploadError,
};
pub use live::{LiveApi, LiveProvisioner, LiveSessionRequest, LiveSessionResult};
pub use oauth::{ClientIdentity, OAuthManager};
pub use retry::RetryPolicy;
pub use session::{AuthSessionManager, Authorizer};
pub use upload::{
    Progress, ProgressSink, ResumableTransport, ResumableUploader, UploadJob, UploadState,
    VideoId, VideoMetadata,
};
pub use youtube_api::{PrivacyStatus, YouTubeClient};
