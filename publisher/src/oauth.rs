//! OAuth 2.0 management for YouTube API authentication.
//!
//! This module encapsulates the two ways of obtaining a [`Credential`]: the interactive
//! consent flow, where the user approves access in their browser and Google redirects
//! back to a short-lived local listener, and the silent refresh of an expired access
//! token.

use crate::credentials::Credential;
use crate::error::AuthError;
use crate::session::Authorizer;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use hyper::body;
use hyper::service::service_fn;
use hyper::{Request, Response};
use jiff::Timestamp;
use oauth2::basic::{BasicClient, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use std::convert::Infallible;
use std::future::Future;
use std::path::Path;
use tokio::sync::mpsc;

/// Google's authorization endpoint, used when the client identity file omits it.
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's token endpoint, used when the client identity file omits it.
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes needed to upload videos and manage live broadcasts.
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube",
];

const OAUTH_DONE: &str = "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>Authorized</title></head>\
<body><h1>YouTube access granted</h1>\
<p>You can close this tab and return to the terminal.</p></body></html>";

const OAUTH_DECLINED: &str = "<!DOCTYPE html>\
<html><head><meta charset=\"utf-8\"><title>Declined</title></head>\
<body><h1>YouTube access was not granted</h1>\
<p>You can close this tab and return to the terminal.</p></body></html>";

/// The application's registered OAuth client, as downloaded from the Google Cloud
/// console.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientIdentity {
    pub client_id: String,
    /// Installed applications embed this value; it is not treated as secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    TOKEN_URL.to_string()
}

/// The `client_secret.json` layout: the identity sits under `installed` or `web`.
#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientIdentity>,
    web: Option<ClientIdentity>,
}

impl ClientIdentity {
    /// Reads a `client_secret.json` file.
    pub async fn load(path: &Path) -> Result<Self, AuthError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| AuthError::ClientIdentity {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;
        Self::from_json(&contents).map_err(|reason| AuthError::ClientIdentity {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parses the contents of a `client_secret.json` file.
    pub fn from_json(contents: &str) -> Result<Self, String> {
        let file: ClientSecretFile = serde_json::from_str(contents).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" client entry".to_string())
    }
}

/// Manages OAuth 2.0 authentication flows for YouTube API access.
///
/// The OAuthManager encapsulates all OAuth operations, providing a consistent interface
/// for both initial user authentication and token refresh operations.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    identity: ClientIdentity,
    scopes: Vec<String>,
    open_browser: bool,
    http: reqwest::Client,
}

impl OAuthManager {
    /// Creates a manager for the given client that requests [`SCOPES`].
    ///
    /// `http` must not follow redirects; see [`Self::http_client`].
    pub fn new(identity: ClientIdentity, http: reqwest::Client) -> Self {
        Self {
            identity,
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            open_browser: true,
            http,
        }
    }

    /// Builds an HTTP client suitable for talking to the token endpoint.
    pub fn http_client() -> Result<reqwest::Client, AuthError> {
        reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| AuthError::CodeExchange(format!("build HTTP client: {e}")))
    }

    /// Whether to launch the user's browser; otherwise the URL is only logged.
    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Performs a complete OAuth 2.0 authorization flow to obtain a new credential.
    ///
    /// This method:
    /// 1. Starts a local HTTP listener to receive the authorization callback
    /// 2. Sends the user's browser to Google's consent screen
    /// 3. Waits, without a timeout, for the callback carrying the authorization code
    /// 4. Exchanges the code (with its PKCE verifier) for tokens
    pub async fn authenticate(&self) -> Result<Credential, AuthError> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_authorization_code) =
            setup_redirect(csrf.clone()).await?;

        let client = BasicClient::new(ClientId::new(self.identity.client_id.clone()))
            .set_auth_uri(parse_endpoint(&self.identity.auth_uri, AuthUrl::new)?)
            .set_token_uri(parse_endpoint(&self.identity.token_uri, TokenUrl::new)?)
            .set_redirect_uri(redirect_url);
        let client = match &self.identity.client_secret {
            Some(secret) => client.set_client_secret(ClientSecret::new(secret.clone())),
            None => client,
        };

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        if self.open_browser {
            if let Err(e) = webbrowser::open(auth_url.as_str()) {
                tracing::warn!(error = %e, url = %auth_url, "could not open browser; visit the URL manually");
            }
        }

        let authorization_code = eventually_authorization_code.await?;

        let token = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::CodeExchange(describe(&e)))?;

        tracing::info!("user authorized YouTube access");
        Ok(self.credential_from(&token))
    }

    /// Attempts to refresh an expired credential using its refresh token.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(new_credential))` - Refresh succeeded; the refresh token is preserved
    ///   if Google did not issue a new one
    /// * `Ok(None)` - No refresh token, or Google no longer honors it
    /// * `Err(_)` - Network or other error occurred during the refresh attempt
    pub async fn refresh_token(
        &self,
        credential: &Credential,
    ) -> Result<Option<Credential>, AuthError> {
        let Some(refresh_token) = &credential.refresh_token else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");

        let client = BasicClient::new(ClientId::new(self.identity.client_id.clone()))
            .set_token_uri(parse_endpoint(&self.identity.token_uri, TokenUrl::new)?);
        let client = match &self.identity.client_secret {
            Some(secret) => client.set_client_secret(ClientSecret::new(secret.clone())),
            None => client,
        };

        match client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(&self.http)
            .await
        {
            Ok(token) => {
                tracing::info!("refreshed OAuth access token");
                let mut refreshed = credential.clone();
                refreshed.rotate(self.credential_from(&token));
                Ok(Some(refreshed))
            }
            Err(RequestTokenError::ServerResponse(ref sr))
                if matches!(sr.error(), BasicErrorResponseType::InvalidGrant) =>
            {
                tracing::warn!(
                    description = sr.error_description().map(String::as_str),
                    "OAuth refresh token considered invalid grant"
                );
                Ok(None)
            }
            Err(e) => Err(AuthError::Refresh(describe(&e))),
        }
    }

    fn credential_from(&self, token: &BasicTokenResponse) -> Credential {
        let scopes: Vec<String> = match token.scopes() {
            Some(granted) => granted.iter().map(|s| s.to_string()).collect(),
            None => self.scopes.clone(),
        };
        Credential::issued_at(
            Timestamp::now(),
            token.access_token().secret().clone(),
            token.refresh_token().map(|rt| rt.secret().clone()),
            token.expires_in(),
            scopes,
        )
    }
}

impl Authorizer for OAuthManager {
    async fn consent(&self) -> Result<Credential, AuthError> {
        self.authenticate().await
    }

    async fn refresh(&self, credential: &Credential) -> Result<Option<Credential>, AuthError> {
        self.refresh_token(credential).await
    }
}

fn parse_endpoint<T>(
    url: &str,
    parse: impl FnOnce(String) -> Result<T, oauth2::url::ParseError>,
) -> Result<T, AuthError> {
    parse(url.to_string()).map_err(|source| AuthError::Endpoint {
        url: url.to_string(),
        source,
    })
}

fn describe<RE>(e: &RequestTokenError<RE, oauth2::basic::BasicErrorResponse>) -> String
where
    RE: std::error::Error + 'static,
{
    match e {
        RequestTokenError::ServerResponse(sr) => match sr.error_description() {
            Some(description) => format!("{}: {description}", sr.error()),
            None => sr.error().to_string(),
        },
        RequestTokenError::Request(inner) => format!("request failed: {inner}"),
        RequestTokenError::Parse(inner, _) => format!("malformed token response: {inner}"),
        RequestTokenError::Other(other) => other.clone(),
    }
}

/// What the local listener makes of one incoming request.
enum Callback {
    Code(AuthorizationCode),
    Denied(String),
    Ignored(StatusCode, &'static str),
}

fn classify_callback(query: Option<&str>, csrf: &CsrfToken) -> Callback {
    let mut presented_state = None;
    let mut presented_code = None;
    let mut presented_error = None;
    for (k, v) in form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        match &*k {
            "state" => presented_state = Some(v),
            "code" => presented_code = Some(v),
            "error" => presented_error = Some(v),
            _ => {}
        }
    }
    if presented_state.as_deref() != Some(csrf.secret().as_str()) {
        return Callback::Ignored(StatusCode::BAD_REQUEST, "invalid csrf token");
    }
    if let Some(error) = presented_error {
        return Callback::Denied(error.into_owned());
    }
    match presented_code {
        Some(code) => Callback::Code(AuthorizationCode::new(code.into_owned())),
        None => Callback::Ignored(StatusCode::BAD_REQUEST, "no authorization code found"),
    }
}

fn html(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::from(body));
    *response.status_mut() = status;
    response
}

/// Sets up a local HTTP server to receive the OAuth authorization callback.
///
/// Binds an ephemeral port on the loopback interface and returns the redirect URL to
/// register with the authorization request, plus a future that resolves once a request
/// with the matching `state` arrives. Requests with the wrong `state` get a 400 and the
/// listener keeps waiting.
async fn setup_redirect(
    csrf: CsrfToken,
) -> Result<
    (
        RedirectUrl,
        impl Future<Output = Result<AuthorizationCode, AuthError>>,
    ),
    AuthError,
> {
    let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(AuthError::Listener)?;
    let addr = socket.local_addr().map_err(AuthError::Listener)?;
    let url = parse_endpoint(&format!("http://{}:{}", addr.ip(), addr.port()), RedirectUrl::new)?;

    let (got, mut gotten) = mpsc::channel::<Result<AuthorizationCode, AuthError>>(1);
    let server = tokio::spawn(async move {
        loop {
            let conn = match socket.accept().await {
                Ok((conn, _)) => conn,
                Err(e) => {
                    let _ = got.try_send(Err(AuthError::Listener(e)));
                    return;
                }
            };
            let got = got.clone();
            let csrf = csrf.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let response = match classify_callback(req.uri().query(), &csrf) {
                        Callback::Code(code) => {
                            let _ = got.try_send(Ok(code));
                            html(StatusCode::OK, OAUTH_DONE)
                        }
                        Callback::Denied(reason) => {
                            let _ = got.try_send(Err(AuthError::ConsentDenied(reason)));
                            html(StatusCode::OK, OAUTH_DECLINED)
                        }
                        Callback::Ignored(status, why) => {
                            tracing::debug!(path = %req.uri().path(), why, "ignoring OAuth callback request");
                            html(status, why)
                        }
                    };
                    async move { Ok::<_, Infallible>(response) }
                });
                let conn = hyper_util::rt::TokioIo::new(conn);
                if let Err(e) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(conn, service)
                    .await
                {
                    tracing::debug!(error = %e, "OAuth callback connection failed");
                }
            });
        }
    });

    Ok((url, async move {
        let code = gotten.recv().await.unwrap_or(Err(AuthError::ConsentAborted));
        server.abort();
        code
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_installed_client_identity() {
        let identity = ClientIdentity::from_json(
            r#"{"installed": {
                "client_id": "123.apps.googleusercontent.com",
                "project_id": "demo",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token",
                "client_secret": "GOCSPX-demo",
                "redirect_uris": ["http://localhost"]
            }}"#,
        )
        .unwrap();
        assert_eq!(identity.client_id, "123.apps.googleusercontent.com");
        assert_eq!(identity.client_secret.as_deref(), Some("GOCSPX-demo"));
        assert_eq!(identity.token_uri, TOKEN_URL);
    }

    #[test]
    fn web_client_identity_falls_back_to_google_endpoints() {
        let identity =
            ClientIdentity::from_json(r#"{"web": {"client_id": "abc"}}"#).unwrap();
        assert_eq!(identity.auth_uri, AUTH_URL);
        assert_eq!(identity.token_uri, TOKEN_URL);
        assert_eq!(identity.client_secret, None);
    }

    #[test]
    fn rejects_unknown_client_identity_layout() {
        assert!(ClientIdentity::from_json(r#"{"service_account": {}}"#).is_err());
        assert!(ClientIdentity::from_json("not json").is_err());
    }

    #[tokio::test]
    async fn missing_client_identity_file_is_an_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientIdentity::load(&dir.path().join("client_secret.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ClientIdentity { .. }));
    }

    #[test]
    fn callback_requires_matching_state() {
        let csrf = CsrfToken::new("expected".to_string());
        assert!(matches!(
            classify_callback(Some("state=other&code=abc"), &csrf),
            Callback::Ignored(StatusCode::BAD_REQUEST, _)
        ));
        assert!(matches!(
            classify_callback(None, &csrf),
            Callback::Ignored(StatusCode::BAD_REQUEST, _)
        ));
        assert!(matches!(
            classify_callback(Some("state=expected"), &csrf),
            Callback::Ignored(StatusCode::BAD_REQUEST, "no authorization code found")
        ));
        match classify_callback(Some("state=expected&code=4%2F0abc&scope=x"), &csrf) {
            Callback::Code(code) => assert_eq!(code.secret(), "4/0abc"),
            _ => panic!("expected an authorization code"),
        }
        match classify_callback(Some("error=access_denied&state=expected"), &csrf) {
            Callback::Denied(reason) => assert_eq!(reason, "access_denied"),
            _ => panic!("expected a denial"),
        }
    }

    #[tokio::test]
    async fn redirect_listener_delivers_code() {
        let csrf = CsrfToken::new("state123".to_string());
        let (url, code) = setup_redirect(csrf).await.unwrap();

        let http = reqwest::Client::new();
        let wrong = http
            .get(format!("{}/?state=nope&code=x", url.as_str()))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong.status(), reqwest::StatusCode::BAD_REQUEST);

        let right = http
            .get(format!("{}/?state=state123&code=the-code", url.as_str()))
            .send()
            .await
            .unwrap();
        assert_eq!(right.status(), reqwest::StatusCode::OK);

        let code = code.await.unwrap();
        assert_eq!(code.secret(), "the-code");
    }

    #[tokio::test]
    async fn redirect_listener_reports_denial() {
        let csrf = CsrfToken::new("state123".to_string());
        let (url, code) = setup_redirect(csrf).await.unwrap();

        reqwest::get(format!("{}/?state=state123&error=access_denied", url.as_str()))
            .await
            .unwrap();

        assert!(matches!(code.await, Err(AuthError::ConsentDenied(r)) if r == "access_denied"));
    }
}
