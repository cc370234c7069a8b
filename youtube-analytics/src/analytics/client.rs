//! The YouTube Analytics `reports.query` client.

use crate::analytics::params::{Dimension, Filters, Metric, ReportQuery};
use crate::analytics::report::QueryResult;
use crate::error::AnalyticsError;
use crate::oauth::{self, AppCredentials, OAuthManager, TimeBoundAccessToken};
use crate::scopes::{self, Scope};
use eyre::Context;
use jiff::civil::Date;
use oauth2::TokenResponse;
use oauth2::basic::BasicTokenResponse;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

pub const BASE_URL: &str = "https://youtubeanalytics.googleapis.com/v2";

/// Where the application's OAuth client comes from.
#[derive(Debug, Clone)]
pub enum AppSource {
    /// A client credentials JSON file, as downloaded from the Google Cloud console.
    CredentialsFile(PathBuf),
    Credentials(AppCredentials),
    Manager(OAuthManager),
}

impl AppSource {
    fn resolve(self) -> eyre::Result<OAuthManager> {
        Ok(match self {
            AppSource::CredentialsFile(path) => OAuthManager::new(AppCredentials::from_file(&path)?),
            AppSource::Credentials(credentials) => OAuthManager::new(credentials),
            AppSource::Manager(manager) => manager,
        })
    }
}

impl From<PathBuf> for AppSource {
    fn from(path: PathBuf) -> Self {
        AppSource::CredentialsFile(path)
    }
}

impl From<&str> for AppSource {
    fn from(path: &str) -> Self {
        AppSource::CredentialsFile(path.into())
    }
}

impl From<AppCredentials> for AppSource {
    fn from(credentials: AppCredentials) -> Self {
        AppSource::Credentials(credentials)
    }
}

impl From<OAuthManager> for AppSource {
    fn from(manager: OAuthManager) -> Self {
        AppSource::Manager(manager)
    }
}

/// Where the user's token comes from.
#[derive(Debug, Clone)]
pub enum UserSource {
    /// A token file written by [`oauth::save_token`]. It is refreshed before first use.
    TokenFile(PathBuf),
    /// A token fresh from [`OAuthManager::authenticate`].
    Token(BasicTokenResponse),
    Session(TimeBoundAccessToken),
}

impl UserSource {
    fn resolve(self) -> eyre::Result<TimeBoundAccessToken> {
        Ok(match self {
            UserSource::TokenFile(path) => TimeBoundAccessToken::expired(oauth::load_token(&path)?),
            UserSource::Token(token) => TimeBoundAccessToken::new(token),
            UserSource::Session(session) => session,
        })
    }
}

impl From<PathBuf> for UserSource {
    fn from(path: PathBuf) -> Self {
        UserSource::TokenFile(path)
    }
}

impl From<&str> for UserSource {
    fn from(path: &str) -> Self {
        UserSource::TokenFile(path.into())
    }
}

impl From<BasicTokenResponse> for UserSource {
    fn from(token: BasicTokenResponse) -> Self {
        UserSource::Token(token)
    }
}

impl From<TimeBoundAccessToken> for UserSource {
    fn from(session: TimeBoundAccessToken) -> Self {
        UserSource::Session(session)
    }
}

/// Client for the YouTube Analytics API, bound to one channel.
///
/// Cloning is cheap and clones share the user's token, so a single client can serve
/// concurrent queries. Expired access tokens are refreshed before a request is sent.
#[derive(Debug, Clone)]
pub struct YouTubeAnalytics {
    channel_id: String,
    token: Arc<Mutex<TimeBoundAccessToken>>,
    oauth_manager: Arc<OAuthManager>,
    client: reqwest::Client,
    base_url: String,
}

impl YouTubeAnalytics {
    /// Creates a client for `channel_id`.
    ///
    /// `scope` defaults to [`Scope::DEFAULT`]. Fails with
    /// [`AnalyticsError::InsufficientScope`] if the user's token was not granted all of it;
    /// no request is made in that case.
    pub fn new(
        channel_id: impl Into<String>,
        app: impl Into<AppSource>,
        user: impl Into<UserSource>,
        scope: Option<&[Scope]>,
    ) -> eyre::Result<Self> {
        let oauth_manager = app.into().resolve().context("load application credentials")?;
        let token = user.into().resolve().context("load user token")?;
        scopes::verify(token.granted_scopes(), scope.unwrap_or(&Scope::DEFAULT[..]))?;

        Ok(Self {
            channel_id: channel_id.into(),
            token: Arc::new(Mutex::new(token)),
            oauth_manager: Arc::new(oauth_manager),
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Sends requests to `base_url` instead of [`BASE_URL`].
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Returns the current user token, including any refresh since construction.
    ///
    /// Store it with [`oauth::save_token`] to avoid a refresh on next start.
    pub async fn token(&self) -> BasicTokenResponse {
        self.token.lock().await.raw_token().clone()
    }

    /// Runs a report for the channel.
    ///
    /// `end_date` defaults to today. Monthly reports end on the first day of the month after
    /// `end_date`.
    ///
    /// # API Reference
    ///
    /// <https://developers.google.com/youtube/analytics/reference/reports/query>
    #[instrument(skip(self), fields(channel_id = %self.channel_id))]
    pub async fn query(
        &self,
        since: Date,
        metrics: &[Metric],
        dimension: Dimension,
        end_date: Option<Date>,
        filters: Option<Filters>,
    ) -> eyre::Result<QueryResult> {
        let request = self.report_query(since, metrics, dimension, end_date, filters)?;
        self.reports_query(&request).await
    }

    /// Runs a report restricted to a single video.
    pub async fn video_query(
        &self,
        video_id: &str,
        since: Date,
        metrics: &[Metric],
        dimension: Dimension,
        end_date: Option<Date>,
    ) -> eyre::Result<QueryResult> {
        self.query(
            since,
            metrics,
            dimension,
            end_date,
            Some(video_filter(video_id)),
        )
        .await
    }

    /// Builds the request [`Self::query`] would send.
    pub fn report_query(
        &self,
        since: Date,
        metrics: &[Metric],
        dimension: Dimension,
        end_date: Option<Date>,
        filters: Option<Filters>,
    ) -> eyre::Result<ReportQuery> {
        let end_date = end_date.unwrap_or_else(|| jiff::Zoned::now().date());
        ReportQuery::new(
            self.channel_id.clone(),
            since,
            end_date,
            metrics,
            dimension,
            filters,
        )
    }

    /// Builds the request [`Self::video_query`] would send.
    pub fn video_report_query(
        &self,
        video_id: &str,
        since: Date,
        metrics: &[Metric],
        dimension: Dimension,
        end_date: Option<Date>,
    ) -> eyre::Result<ReportQuery> {
        self.report_query(since, metrics, dimension, end_date, Some(video_filter(video_id)))
    }

    async fn reports_query(&self, request: &ReportQuery) -> eyre::Result<QueryResult> {
        let url = format!("{}/reports", self.base_url);
        let params = request.to_params();

        let response = self.get_json(&url, &params).await?;
        let result = QueryResult::from_response(response)?;

        tracing::debug!(
            columns = result.column_headers.len(),
            rows = result.rows.len(),
            "fetched analytics report"
        );

        Ok(result)
    }

    /// Gets a guaranteed-fresh access token, refreshing if necessary.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut token = self.token.lock().await;

        if token.is_expired() {
            tracing::debug!("access token expired, attempting refresh");

            if token.refresh(&self.oauth_manager).await? {
                tracing::debug!("access token successfully refreshed");
            } else {
                tracing::error!("access token refresh failed, client is unusable");
                eyre::bail!("unable to refresh expired access token");
            }
        }

        Ok(token.raw_token().access_token().secret().to_string())
    }

    /// Makes an authenticated GET request and decodes the JSON body.
    ///
    /// Non-success statuses become [`AnalyticsError::Http`] carrying the raw body.
    #[instrument(skip(self, params), level = tracing::Level::TRACE)]
    async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> eyre::Result<serde_json::Value> {
        let access_token = self.fresh_access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .query(params)
            .send()
            .await
            .with_context(|| format!("send GET request to YouTube Analytics API: {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(AnalyticsError::Http { status, body }.into());
        }

        response
            .json()
            .await
            .context("parse YouTube Analytics API response as JSON")
    }
}

fn video_filter(video_id: &str) -> Filters {
    Filters::new().with("video", video_id)
}
