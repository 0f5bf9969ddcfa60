use std::borrow::Cow;

use chrono::Utc;
use log::{debug, info};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::FitnessConfig;
use crate::error::FetchError;
use crate::schema::{Profile, User};
use crate::util::TimeRange;

use super::fetcher::MetricFetcher;
use super::response::{AggregateRequest, AggregateResponse, PersonResponse, RefreshRequest, TokenResponse};

pub const DEFAULT_FITNESS_URL: &str = "https://www.googleapis.com/fitness/v1";
pub const DEFAULT_PEOPLE_URL: &str = "https://people.googleapis.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const STEP_COUNT_TYPE: &str = "com.google.step_count.delta";
pub const ESTIMATED_STEPS_SOURCE: &str =
    "derived:com.google.step_count.delta:com.google.android.gms:estimated_steps";

/// Google Fitness + People API fetcher
///
/// This fetcher implements the `MetricFetcher` trait and encapsulates
/// all Google-specific HTTP behavior:
/// - request payload formats
/// - bearer authorization with the user's access token
/// - refreshing an expired access token
/// - status and response translation
///
/// TOKEN REFRESH:
/// - Only attempted for an expired credential carrying a refresh token
/// - Needs `client_id` and `client_secret` in configuration
/// - The fresh token is used for the current call only and is never
///   written back to the registry
///
/// DESIGN PRINCIPLES:
/// - No retries
/// - Read-only calls only
///
pub struct GoogleFitFetcher {
    http: Client,
    fitness_url: String,
    people_url: String,
    token_url: String,
    client: Option<(String, String)>,
    data_type_name: String,
    data_source_id: String,
}

impl GoogleFitFetcher {
    pub fn new(http: Client, cfg: &FitnessConfig) -> Self {
        Self {
            http,
            fitness_url: trim_base(cfg.fitness_url.as_deref().unwrap_or(DEFAULT_FITNESS_URL)),
            people_url: trim_base(cfg.people_url.as_deref().unwrap_or(DEFAULT_PEOPLE_URL)),
            token_url: cfg.token_url.clone().unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            client: cfg.client_id.clone().zip(cfg.client_secret.clone()),
            data_type_name: cfg.data_type_name.clone().unwrap_or_else(|| STEP_COUNT_TYPE.to_string()),
            data_source_id: cfg
                .data_source_id
                .clone()
                .unwrap_or_else(|| ESTIMATED_STEPS_SOURCE.to_string()),
        }
    }

    fn aggregate_url(&self) -> String {
        format!("{}/users/me/dataset:aggregate", self.fitness_url)
    }

    fn person_url(&self) -> String {
        format!("{}/people/me?personFields=photos,names", self.people_url)
    }

    async fn step_count(&self, user: &User, range: TimeRange) -> Result<u64, FetchError> {
        let body = AggregateRequest::single_bucket(range, &self.data_type_name, &self.data_source_id);
        let request = self.http.post(self.aggregate_url()).json(&body);

        let response: AggregateResponse = self.send_authorized(request, user).await?;
        response.first_step_count()
    }

    /// Sends `request` with the user's bearer token and decodes the JSON body.
    ///
    /// STATUS MAPPING:
    /// - 401 / 403  -> Auth
    /// - other !2xx -> Status
    /// - bad JSON   -> Malformed
    ///
    async fn send_authorized<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        user: &User,
    ) -> Result<T, FetchError> {
        let token = self.access_token(user).await?;

        let response = request.bearer_auth(&token).send().await?;

        let status = response.status();
        debug!("[google-fit] {} {} -> {}", user.email, response.url().path(), status);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Auth(format!("{}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))
    }

    /// The stored access token, or a refreshed one when it has expired.
    async fn access_token<'u>(&self, user: &'u User) -> Result<Cow<'u, str>, FetchError> {
        let credential = &user.credential;
        if !credential.is_expired(Utc::now()) {
            return Ok(Cow::Borrowed(&credential.access_token));
        }

        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            return Err(FetchError::Auth("access token expired".into()));
        };
        let Some(request) = self.refresh_request(refresh_token) else {
            return Err(FetchError::Auth(
                "access token expired and no client credentials are configured".into(),
            ));
        };

        let refreshed = exchange(request)
            .await
            .map_err(|e| FetchError::Auth(format!("token refresh failed: {}", e)))?;

        info!(
            "[google-fit] refreshed access token for {} (expires in {:?}s)",
            user.email, refreshed.expires_in
        );
        Ok(Cow::Owned(refreshed.access_token))
    }

    fn refresh_request(&self, refresh_token: &str) -> Option<RequestBuilder> {
        let (client_id, client_secret) = self.client.as_ref()?;
        let body = RefreshRequest::new(refresh_token, client_id, client_secret);
        Some(self.http.post(&self.token_url).json(&body))
    }
}

#[async_trait::async_trait]
impl MetricFetcher for GoogleFitFetcher {
    fn name(&self) -> &'static str {
        "google-fit"
    }

    async fn weekly_steps(&self, user: &User, range: TimeRange) -> Result<u64, FetchError> {
        self.step_count(user, range).await
    }

    async fn daily_steps(&self, user: &User, range: TimeRange) -> Result<u64, FetchError> {
        self.step_count(user, range).await
    }

    async fn profile(&self, user: &User) -> Result<Profile, FetchError> {
        let request = self.http.get(self.person_url());

        let person: PersonResponse = self.send_authorized(request, user).await?;
        Ok(person.into_profile())
    }
}

async fn exchange(request: RequestBuilder) -> Result<TokenResponse, FetchError> {
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
