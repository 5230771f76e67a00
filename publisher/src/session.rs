//! Turns whatever credential is cached into an authenticated API handle.

use crate::config::ApiEndpoints;
use crate::credentials::{Credential, CredentialStore};
use crate::error::AuthError;
use crate::youtube_api::YouTubeClient;
use jiff::Timestamp;
use std::future::Future;

/// The two ways of obtaining a credential from the platform.
pub trait Authorizer {
    /// Runs the interactive consent flow.
    ///
    /// Suspends until the user completes (or declines) authorization in their browser.
    fn consent(&self) -> impl Future<Output = Result<Credential, AuthError>> + Send;

    /// Exchanges the refresh token of `credential` for a new access token.
    ///
    /// `Ok(None)` means the refresh token is missing, revoked, or expired.
    fn refresh(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<Option<Credential>, AuthError>> + Send;
}

/// Produces authenticated [`YouTubeClient`]s, consenting or refreshing as needed.
#[derive(Debug)]
pub struct AuthSessionManager<A> {
    store: CredentialStore,
    authorizer: A,
    http: reqwest::Client,
    endpoints: ApiEndpoints,
}

impl<A: Authorizer> AuthSessionManager<A> {
    pub fn new(
        store: CredentialStore,
        authorizer: A,
        http: reqwest::Client,
        endpoints: ApiEndpoints,
    ) -> Self {
        Self {
            store,
            authorizer,
            http,
            endpoints,
        }
    }

    /// Returns a handle bound to a valid access token.
    #[tracing::instrument(skip(self), err)]
    pub async fn get_authenticated_handle(&self) -> Result<YouTubeClient, AuthError> {
        let credential = self.authorize().await?;
        Ok(self.handle_for(&credential))
    }

    /// Discards any cached credential and runs the consent flow again.
    #[tracing::instrument(skip(self), err)]
    pub async fn reconsent(&self) -> Result<YouTubeClient, AuthError> {
        let credential = self.authorizer.consent().await?;
        self.store.save(&credential).await?;
        Ok(self.handle_for(&credential))
    }

    /// Produces a valid credential and persists it.
    ///
    /// 1. A cached, unexpired credential is used as-is.
    /// 2. An expired one with a refresh token is refreshed silently.
    /// 3. Otherwise, or if Google refuses the refresh token, the user is asked to consent.
    pub async fn authorize(&self) -> Result<Credential, AuthError> {
        let now = Timestamp::now();
        let cached = self.store.load().await;

        let credential = match cached {
            Some(credential) if credential.is_valid(now) => {
                tracing::debug!(expires_at = %credential.expires_at, "using cached credential");
                return Ok(credential);
            }
            Some(credential) if credential.refresh_token.is_some() => {
                tracing::info!("cached access token expired, refreshing");
                match self.authorizer.refresh(&credential).await? {
                    Some(refreshed) => refreshed,
                    None => {
                        tracing::warn!("refresh token rejected, asking user to authorize again");
                        self.authorizer.consent().await?
                    }
                }
            }
            Some(_) => {
                tracing::info!("cached credential expired and cannot be refreshed");
                self.authorizer.consent().await?
            }
            None => {
                tracing::info!("no cached credential, asking user to authorize");
                self.authorizer.consent().await?
            }
        };

        self.store.save(&credential).await?;
        Ok(credential)
    }

    fn handle_for(&self, credential: &Credential) -> YouTubeClient {
        YouTubeClient::new(
            credential.access_token.clone(),
            self.http.clone(),
            self.endpoints.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::SignedDuration;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Scripted authorizer that records which flows were used.
    #[derive(Default)]
    struct FakeAuthorizer {
        refresh_result: Mutex<Option<Result<Option<Credential>, AuthError>>>,
        consents: Mutex<u32>,
        refreshes: Mutex<u32>,
    }

    impl FakeAuthorizer {
        fn refreshing_to(result: Result<Option<Credential>, AuthError>) -> Self {
            Self {
                refresh_result: Mutex::new(Some(result)),
                ..Self::default()
            }
        }

        fn consents(&self) -> u32 {
            *self.consents.lock().unwrap()
        }

        fn refreshes(&self) -> u32 {
            *self.refreshes.lock().unwrap()
        }
    }

    impl Authorizer for FakeAuthorizer {
        async fn consent(&self) -> Result<Credential, AuthError> {
            *self.consents.lock().unwrap() += 1;
            Ok(credential("ya29.consented", Some("1//consented"), hours(1)))
        }

        async fn refresh(&self, _: &Credential) -> Result<Option<Credential>, AuthError> {
            *self.refreshes.lock().unwrap() += 1;
            self.refresh_result
                .lock()
                .unwrap()
                .take()
                .expect("refresh called more than scripted")
        }
    }

    fn hours(n: i64) -> SignedDuration {
        SignedDuration::from_hours(n)
    }

    fn credential(access: &str, refresh: Option<&str>, ttl: SignedDuration) -> Credential {
        Credential {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Timestamp::now() + ttl,
            scopes: Default::default(),
        }
    }

    fn manager(
        dir: &tempfile::TempDir,
        authorizer: FakeAuthorizer,
    ) -> AuthSessionManager<FakeAuthorizer> {
        AuthSessionManager::new(
            CredentialStore::new(dir.path().join("token.json")),
            authorizer,
            reqwest::Client::new(),
            ApiEndpoints::default(),
        )
    }

    #[tokio::test]
    async fn first_run_asks_for_consent_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir, FakeAuthorizer::default());

        let got = sessions.authorize().await.unwrap();
        assert_eq!(got.access_token, "ya29.consented");
        assert_eq!(sessions.authorizer.consents(), 1);
        assert_eq!(sessions.store.load().await, Some(got));
    }

    #[tokio::test]
    async fn valid_cache_needs_no_network() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir, FakeAuthorizer::default());
        let cached = credential("ya29.cached", Some("1//r"), hours(1));
        sessions.store.save(&cached).await.unwrap();

        let handle = sessions.get_authenticated_handle().await.unwrap();
        assert_eq!(handle.access_token(), "ya29.cached");
        assert_eq!(sessions.authorizer.consents(), 0);
        assert_eq!(sessions.authorizer.refreshes(), 0);
    }

    #[tokio::test]
    async fn expired_cache_is_refreshed_and_rotated() {
        let dir = tempfile::tempdir().unwrap();
        let expired = credential("ya29.old", Some("1//keep"), hours(-1));
        let mut rotated = expired.clone();
        rotated.rotate(credential("ya29.new", None, hours(1)));
        let sessions = manager(&dir, FakeAuthorizer::refreshing_to(Ok(Some(rotated))));
        sessions.store.save(&expired).await.unwrap();

        let got = sessions.authorize().await.unwrap();
        assert_eq!(got.access_token, "ya29.new");
        assert_eq!(got.refresh_token.as_deref(), Some("1//keep"));
        assert_eq!(sessions.authorizer.refreshes(), 1);
        assert_eq!(sessions.authorizer.consents(), 0);
        assert_eq!(sessions.store.load().await, Some(got));
    }

    #[tokio::test]
    async fn rejected_refresh_falls_back_to_consent() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir, FakeAuthorizer::refreshing_to(Ok(None)));
        sessions
            .store
            .save(&credential("ya29.old", Some("1//revoked"), hours(-1)))
            .await
            .unwrap();

        let got = sessions.authorize().await.unwrap();
        assert_eq!(got.access_token, "ya29.consented");
        assert_eq!(sessions.authorizer.refreshes(), 1);
        assert_eq!(sessions.authorizer.consents(), 1);
    }

    #[tokio::test]
    async fn expired_without_refresh_token_asks_for_consent() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir, FakeAuthorizer::default());
        sessions
            .store
            .save(&credential("ya29.old", None, hours(-1)))
            .await
            .unwrap();

        sessions.authorize().await.unwrap();
        assert_eq!(sessions.authorizer.refreshes(), 0);
        assert_eq!(sessions.authorizer.consents(), 1);
    }

    #[tokio::test]
    async fn refresh_network_failure_surfaces_and_keeps_cache() {
        let dir = tempfile::tempdir().unwrap();
        let expired = credential("ya29.old", Some("1//r"), hours(-1));
        let sessions = manager(
            &dir,
            FakeAuthorizer::refreshing_to(Err(AuthError::Refresh("connection reset".into()))),
        );
        sessions.store.save(&expired).await.unwrap();

        let err = sessions.get_authenticated_handle().await.unwrap_err();
        assert!(matches!(err, AuthError::Refresh(_)));
        assert_eq!(sessions.authorizer.consents(), 0);
        assert_eq!(sessions.store.load().await, Some(expired));
    }

    #[tokio::test]
    async fn reconsent_replaces_a_valid_cache() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = manager(&dir, FakeAuthorizer::default());
        sessions
            .store
            .save(&credential("ya29.cached", Some("1//old"), hours(1)))
            .await
            .unwrap();

        let handle = sessions.reconsent().await.unwrap();
        assert_eq!(handle.access_token(), "ya29.consented");
        let stored = sessions.store.load().await.unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("1//consented"));
    }
}
