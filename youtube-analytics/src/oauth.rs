//! OAuth 2.0 management for YouTube Analytics API authentication.
//!
//! Covers loading the application's client credentials, persisting the user's token, the
//! installed-app browser flow used to obtain a token in the first place, and token refresh.

use crate::scopes::Scope;
use eyre::Context;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, body};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge, RedirectUrl,
    TokenUrl,
};
use oauth2::{TokenResponse, reqwest};
use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Google OAuth2 token endpoint URL used for both initial authentication and token refresh
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

const OAUTH_DONE_HTML: &str = "<!DOCTYPE html><html><body>\
    <p>YouTube Analytics access granted. You can close this window.</p>\
    </body></html>";

/// The OAuth client identity of the application querying the API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google's downloadable client secret files nest the credentials under the client type.
#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialsFile {
    Installed { installed: AppCredentials },
    Web { web: AppCredentials },
    Flat(AppCredentials),
}

impl AppCredentials {
    /// Parses credentials as downloaded from the Google Cloud console.
    ///
    /// Accepts `{"installed": {...}}`, `{"web": {...}}`, or a bare
    /// `{"client_id": ..., "client_secret": ...}` object.
    pub fn from_json(json: &str) -> eyre::Result<Self> {
        let file: CredentialsFile =
            serde_json::from_str(json).context("parse OAuth client credentials")?;
        Ok(match file {
            CredentialsFile::Installed { installed } => installed,
            CredentialsFile::Web { web } => web,
            CredentialsFile::Flat(creds) => creds,
        })
    }

    pub fn from_file(path: &Path) -> eyre::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read OAuth client credentials from {}", path.display()))?;
        Self::from_json(&json)
    }
}

/// Reads a user token previously written by [`save_token`].
pub fn load_token(path: &Path) -> eyre::Result<BasicTokenResponse> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("read user token from {}", path.display()))?;
    serde_json::from_str(&json).context("parse stored user token")
}

/// Writes a user token so later runs can skip the browser flow.
pub fn save_token(path: &Path, token: &BasicTokenResponse) -> eyre::Result<()> {
    let json = serde_json::to_string_pretty(token).context("serialize user token")?;
    std::fs::write(path, json).with_context(|| format!("write user token to {}", path.display()))
}

/// Manages OAuth 2.0 authentication flows for YouTube Analytics API access.
#[derive(Debug, Clone)]
pub struct OAuthManager {
    credentials: AppCredentials,
}

impl OAuthManager {
    pub fn new(credentials: AppCredentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &AppCredentials {
        &self.credentials
    }

    fn http_client() -> eyre::Result<reqwest::Client> {
        reqwest::ClientBuilder::new()
            // SSRF no thank you.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth HTTP client")
    }

    /// Performs a complete OAuth 2.0 authorization flow to obtain a new token.
    ///
    /// Opens the user's browser on Google's consent page, receives the redirect on a
    /// one-shot localhost server, and exchanges the authorization code for a token.
    ///
    /// Google normally echoes the granted scopes in the token response. If it does not, the
    /// scopes from the redirect are recorded on the token instead so they can be verified
    /// later.
    pub async fn authenticate(&self, scopes: &[Scope]) -> eyre::Result<BasicTokenResponse> {
        let csrf = CsrfToken::new_random();
        let (redirect_url, eventually_redirect) = self
            .setup_redirect(csrf.clone())
            .await
            .context("set up redirect endpoint")?;

        let client = BasicClient::new(ClientId::new(self.credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.credentials.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(AUTH_URL.to_string()).context("parse auth endpoint")?)
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("parse token endpoint")?)
            .set_redirect_uri(redirect_url);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf_token) = client
            // We never re-use the CSRF since we only go through the flow exactly once.
            .authorize_url(move || csrf.clone())
            .add_scopes(scopes.iter().map(|s| s.to_oauth()))
            // Needed for Google to hand out a refresh token.
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(pkce_challenge)
            .url();

        tracing::info!(url = %auth_url, "asking user to follow OAuth flow");
        webbrowser::open(auth_url.as_ref()).context("open user's browser")?;
        let (authorization_code, presented_scope) = eventually_redirect
            .await
            .context("await user authorization code")?;

        let mut token = client
            .exchange_code(authorization_code)
            .set_pkce_verifier(pkce_verifier)
            .request_async(&Self::http_client()?)
            .await
            .context("exchange authorization code with access token")?;

        if token.scopes().is_none() {
            if let Some(presented) = presented_scope {
                token.set_scopes(Some(
                    presented
                        .split_whitespace()
                        .map(|s| oauth2::Scope::new(s.to_string()))
                        .collect(),
                ));
            }
        }

        Ok(token)
    }

    /// Attempts to refresh an existing OAuth token using its refresh token.
    ///
    /// * `Ok(Some(new_token))` - Refresh succeeded, new token is available
    /// * `Ok(None)` - Refresh failed or no refresh token available
    /// * `Err(_)` - Network or other error occurred during refresh attempt
    pub async fn refresh_token(
        &self,
        token: &BasicTokenResponse,
    ) -> eyre::Result<Option<BasicTokenResponse>> {
        let Some(refresh_token) = token.refresh_token() else {
            tracing::warn!("no refresh token available, cannot refresh");
            return Ok(None);
        };

        tracing::debug!("attempting to refresh OAuth token");

        let client = BasicClient::new(ClientId::new(self.credentials.client_id.clone()))
            .set_client_secret(ClientSecret::new(self.credentials.client_secret.clone()))
            .set_token_uri(TokenUrl::new(TOKEN_URL.to_string()).context("parse token endpoint")?);

        match client
            .exchange_refresh_token(refresh_token)
            .request_async(&Self::http_client()?)
            .await
        {
            Ok(new_token) => {
                tracing::debug!("successfully refreshed OAuth token");
                Ok(Some(new_token))
            }
            Err(ref e @ oauth2::RequestTokenError::ServerResponse(ref sr))
                if matches!(
                    sr.error(),
                    oauth2::basic::BasicErrorResponseType::InvalidGrant
                ) =>
            {
                tracing::warn!("OAuth refresh token considered invalid grant: {}", e);
                Ok(None)
            }
            Err(e) => Err(e).context("exchange refresh token"),
        }
    }

    /// Sets up a local HTTP server to receive the OAuth authorization callback.
    ///
    /// Returns the redirect URL to use in the flow and a future that resolves to the
    /// authorization code (and the space-separated granted scopes, if presented) once the
    /// browser is redirected back with a matching `state`.
    async fn setup_redirect(
        &self,
        csrf: CsrfToken,
    ) -> eyre::Result<(
        RedirectUrl,
        impl Future<Output = eyre::Result<(AuthorizationCode, Option<String>)>>,
    )> {
        let socket = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind to localhost")?;
        let addr = socket.local_addr().context("get local address")?;
        let url = RedirectUrl::new(format!("http://{}:{}", addr.ip(), addr.port()))
            .context("construct redirect url")?;
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let r = async move {
                let (conn, _) = socket.accept().await.context("accept")?;
                let conn = hyper_util::rt::TokioIo::new(conn);
                let (got, mut gotten) = tokio::sync::mpsc::channel(1);
                let service = service_fn(move |req: Request<body::Incoming>| {
                    let csrf = csrf.clone();
                    let got = got.clone();
                    async move {
                        let mut presented_state = None;
                        let mut presented_code = None;
                        // space-separated
                        let mut presented_scope = None;
                        for (k, v) in
                            form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                        {
                            match &*k {
                                "state" => presented_state = Some(v),
                                "code" => presented_code = Some(v),
                                "scope" => presented_scope = Some(v.into_owned()),
                                _ => {}
                            }
                        }
                        if presented_state.as_deref() != Some(csrf.secret().as_str()) {
                            return Err("invalid csrf token");
                        }
                        let Some(code) = presented_code else {
                            return Err("no authorization code found");
                        };
                        let code = AuthorizationCode::new(code.into_owned());
                        if got.send((code, presented_scope)).await.is_err() {
                            return Err("redirect receiver went away");
                        }
                        Ok(Response::new(Full::<Bytes>::from(OAUTH_DONE_HTML)))
                    }
                });
                let mut serve = std::pin::pin!(
                    hyper::server::conn::http1::Builder::new().serve_connection(conn, service)
                );

                tokio::select! {
                    exit = &mut serve => {
                        if let Err(e) = exit {
                            Err(e).context("redirect server got bad request")
                        } else {
                            eyre::bail!("redirect server exit prematurely");
                        }
                    }
                    redirect = gotten.recv() => {
                        serve.as_mut().graceful_shutdown();
                        // Let the success page make it back to the browser.
                        let _ = serve.await;
                        redirect.ok_or_else(|| eyre::eyre!("redirect handler dropped"))
                    }
                }
            };
            let _ = tx.send(r.await);
        });
        Ok((url, async move {
            rx.await.context("redirect future dropped prematurely")?
        }))
    }
}

/// A user token paired with the moment its access token stops being usable.
#[derive(Debug, Clone)]
pub struct TimeBoundAccessToken {
    token: BasicTokenResponse,
    /// When the current access token expires (with safety buffer)
    expires_at: SystemTime,
}

impl TimeBoundAccessToken {
    /// Wraps a token that must be refreshed before first use.
    ///
    /// Used for tokens loaded from storage, whose issue time is unknown.
    pub fn expired(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: SystemTime::UNIX_EPOCH,
            token,
        }
    }

    /// Wraps a freshly issued token, computing its expiry from `expires_in`.
    pub fn new(token: BasicTokenResponse) -> Self {
        Self {
            expires_at: Self::calculate_token_expiry(&token),
            token,
        }
    }

    pub fn raw_token(&self) -> &BasicTokenResponse {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }

    /// Scopes recorded on the token. A token with no recorded scopes grants nothing.
    pub fn granted_scopes(&self) -> &[oauth2::Scope] {
        self.token.scopes().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Refreshes this token, preserving the refresh token and granted scopes.
    ///
    /// * `Ok(true)` - Token was successfully refreshed
    /// * `Ok(false)` - Refresh failed (invalid grant, no refresh token, etc.)
    /// * `Err(_)` - Network or other error occurred
    pub async fn refresh(&mut self, oauth_manager: &OAuthManager) -> eyre::Result<bool> {
        tracing::trace!("refreshing token");
        match oauth_manager
            .refresh_token(&self.token)
            .await
            .context("refresh OAuth token")?
        {
            Some(new_token) => {
                self.replace(new_token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn replace(&mut self, new_token: BasicTokenResponse) {
        let old_token = std::mem::replace(&mut self.token, new_token);

        // Google usually omits the refresh token from refresh responses.
        if self.token.refresh_token().is_none() {
            tracing::trace!("new token lacks refresh token, preserving original");
            self.token
                .set_refresh_token(old_token.refresh_token().cloned());
        }
        if self.token.scopes().is_none() {
            self.token.set_scopes(old_token.scopes().cloned());
        }

        self.expires_at = Self::calculate_token_expiry(&self.token);
    }

    /// Uses the current time + expires_in duration - 5 minute safety buffer.
    /// If no expires_in is provided, assumes a conservative 55-minute lifetime.
    fn calculate_token_expiry(token: &BasicTokenResponse) -> SystemTime {
        let now = SystemTime::now();
        if let Some(expires_in) = token.expires_in() {
            now + expires_in.saturating_sub(Duration::from_secs(300))
        } else {
            now + Duration::from_secs(3300)
        }
    }
}
