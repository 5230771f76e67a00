//! The on-disk credential cache.

use crate::error::StoreError;
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Taken off a token's advertised lifetime so it is never used right at the edge.
const EXPIRY_SAFETY_MARGIN: SignedDuration = SignedDuration::from_secs(300);

/// Assumed lifetime when the token endpoint does not say.
const DEFAULT_LIFETIME: SignedDuration = SignedDuration::from_secs(3300);

/// An OAuth access/refresh token pair together with its expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    /// Once obtained, only replaced by an explicit re-consent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: Timestamp,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
}

impl Credential {
    /// Builds a credential from a fresh token response.
    ///
    /// The expiry is `now + expires_in` minus a five-minute safety margin, never earlier
    /// than `now`.
    pub fn issued_at(
        now: Timestamp,
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<std::time::Duration>,
        scopes: impl IntoIterator<Item = String>,
    ) -> Self {
        let lifetime = match expires_in {
            Some(expires_in) => SignedDuration::try_from(expires_in)
                .unwrap_or(SignedDuration::MAX)
                .saturating_sub(EXPIRY_SAFETY_MARGIN)
                .max(SignedDuration::ZERO),
            None => DEFAULT_LIFETIME,
        };
        Self {
            access_token,
            refresh_token,
            expires_at: now.checked_add(lifetime).unwrap_or(Timestamp::MAX),
            scopes: scopes.into_iter().collect(),
        }
    }

    /// True iff the access token has not expired at `now`.
    pub fn is_valid(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    /// Swaps in a refreshed access token.
    ///
    /// The refresh token is only replaced if the refresh response carried a new one.
    pub fn rotate(&mut self, refreshed: Credential) {
        let Credential {
            access_token,
            refresh_token,
            expires_at,
            scopes,
        } = refreshed;
        self.access_token = access_token;
        self.expires_at = expires_at;
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        if !scopes.is_empty() {
            self.scopes = scopes;
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Reads and writes a [`Credential`] at a fixed path.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cached credential.
    ///
    /// A missing, unreadable, or corrupt cache yields `None`.
    pub async fn load(&self) -> Option<Credential> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no cached credential");
                return None;
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "credential cache unreadable");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(credential) => Some(credential),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt credential cache");
                None
            }
        }
    }

    /// Overwrites the cache with `credential`.
    ///
    /// The new contents are written next to the cache and renamed over it, so readers
    /// see either the old or the new credential.
    pub async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(credential)?;
        let tmp = self.staging_path();
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        // a leftover from an interrupted save may carry looser permissions
        match tokio::fs::remove_file(&tmp).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(io_err(e)),
            _ => {}
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let written = async {
            let mut file = options.open(&tmp).await?;
            file.write_all(&json).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }

        tracing::debug!(path = %self.path.display(), "saved credential");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
