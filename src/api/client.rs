//! REST backend client.

use super::{
    DataConverter, Page, PricePointRecord, ScoreUpdateBody, SignalBackend, SignalQuery,
    SignalRecord,
};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::lifecycle::PricePoint;
use crate::session::Session;
use crate::state::Signal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Builder for creating an API client.
pub struct ApiClientBuilder {
    config: ApiConfig,
    http: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    /// Create a new builder with default config.
    pub fn new() -> Self {
        Self {
            config: ApiConfig::default(),
            http: None,
        }
    }

    /// Set the API configuration.
    pub fn config(mut self, config: ApiConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a preconfigured reqwest client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Build the API client.
    pub fn build(self) -> Result<ApiClient> {
        let http = match self.http {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .user_agent(concat!("signalroom/", env!("CARGO_PKG_VERSION")))
                .build()?,
        };
        Ok(ApiClient::with_http(self.config, http))
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client for the signals backend.
pub struct ApiClient {
    /// Configuration.
    config: ApiConfig,
    /// Underlying HTTP client.
    http: reqwest::Client,
    /// Rate limiter state.
    rate_limiter: Arc<RwLock<RateLimiter>>,
}

impl ApiClient {
    /// Create a new API client from configuration.
    pub fn new(config: ApiConfig) -> Result<Self> {
        ApiClientBuilder::new().config(config).build()
    }

    fn with_http(config: ApiConfig, http: reqwest::Client) -> Self {
        let rate_limiter = Arc::new(RwLock::new(RateLimiter::new(config.rate_limit.max(1))));
        Self {
            config,
            http,
            rate_limiter,
        }
    }

    /// Base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str, session: Option<&Session>) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        let token = session
            .and_then(|s| s.token.as_deref())
            .or(self.config.auth_token.as_deref());
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request, retrying recoverable failures up to `max_retries` times.
    ///
    /// A 429 waits for the server's `Retry-After`; other failures back off
    /// linearly.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        let mut attempt = 0;
        loop {
            self.rate_limit().await?;
            let result = match build().send().await {
                Ok(response) => Self::check_status(response).await,
                Err(e) => Err(Error::Http(e)),
            };

            match result {
                Err(e) if e.is_recoverable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = match &e {
                        Error::RateLimited(secs) => Duration::from_secs(*secs),
                        _ => Duration::from_millis(200 * u64::from(attempt)),
                    };
                    warn!("Request failed (attempt {}): {}", attempt, e);
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(Error::RateLimited(retry_after));
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::auth(body)),
            StatusCode::NOT_FOUND => Err(Error::not_found(body)),
            _ => Err(Error::api(status.as_u16(), body)),
        }
    }

    async fn put_json<B: Serialize + Sync>(
        &self,
        path: &str,
        session: Option<&Session>,
        body: &B,
    ) -> Result<()> {
        debug!("PUT {}", path);
        self.send(|| self.request(Method::PUT, path, session).json(body))
            .await?;
        Ok(())
    }

    /// Apply rate limiting.
    async fn rate_limit(&self) -> Result<()> {
        let mut limiter = self.rate_limiter.write().await;
        limiter.wait().await
    }
}

#[async_trait]
impl SignalBackend for ApiClient {
    async fn list_signals(&self, query: &SignalQuery) -> Result<Page<Signal>> {
        let pairs = query.to_pairs();
        debug!("GET /signals {:?}", pairs);
        let response = self
            .send(|| self.request(Method::GET, "/signals", None).query(&pairs))
            .await?;
        let page: Page<SignalRecord> = response.json().await?;
        Ok(page.map(DataConverter::convert_signal))
    }

    async fn create_signal(&self, session: &Session, signal: &Signal) -> Result<Signal> {
        if !session.is(&signal.publisher) {
            return Err(Error::auth("Signals can only be published as yourself"));
        }
        let record = DataConverter::signal_record(signal);
        let response = self
            .send(|| {
                self.request(Method::POST, "/signals", Some(session))
                    .json(&record)
            })
            .await?;
        let created: SignalRecord = response.json().await?;
        Ok(DataConverter::convert_signal(created))
    }

    async fn update_signal(&self, session: &Session, signal: &Signal) -> Result<()> {
        let body = DataConverter::update_body(signal);
        self.put_json(&format!("/signals/{}", signal.id), Some(session), &body)
            .await
    }

    async fn update_signal_status(&self, signal: &Signal) -> Result<()> {
        let body = DataConverter::status_body(signal);
        self.put_json(&format!("/signals/{}/status", signal.id), None, &body)
            .await
    }

    async fn like_signal(&self, session: &Session, signal_id: &str) -> Result<()> {
        let path = format!("/signals/{}/like", signal_id);
        self.send(|| self.request(Method::POST, &path, Some(session)))
            .await?;
        Ok(())
    }

    async fn dislike_signal(&self, session: &Session, signal_id: &str) -> Result<()> {
        let path = format!("/signals/{}/dislike", signal_id);
        self.send(|| self.request(Method::POST, &path, Some(session)))
            .await?;
        Ok(())
    }

    async fn apply_score(&self, username: &str, signal_id: &str, delta: Decimal) -> Result<()> {
        let body = ScoreUpdateBody {
            signal_id: signal_id.to_string(),
            delta,
        };
        self.put_json(&format!("/users/{}/score", username), None, &body)
            .await
    }

    async fn market_highs(
        &self,
        pair_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PricePoint>> {
        let path = format!("/markets/{}/highs", pair_id);
        let pairs = [
            ("from", from.timestamp_millis().to_string()),
            ("to", to.timestamp_millis().to_string()),
        ];
        debug!("GET {} {:?}", path, pairs);
        let response = self
            .send(|| self.request(Method::GET, &path, None).query(&pairs))
            .await?;
        let records: Vec<PricePointRecord> = response.json().await?;
        Ok(records
            .into_iter()
            .map(DataConverter::convert_price_point)
            .collect())
    }
}

/// Simple token-bucket rate limiter.
struct RateLimiter {
    requests_per_second: u32,
    last_request: std::time::Instant,
    tokens: f64,
}

impl RateLimiter {
    fn new(requests_per_second: u32) -> Self {
        Self {
            requests_per_second,
            last_request: std::time::Instant::now(),
            tokens: requests_per_second as f64,
        }
    }

    async fn wait(&mut self) -> Result<()> {
        let now = std::time::Instant::now();
        let elapsed = now.duration_since(self.last_request).as_secs_f64();

        // Replenish tokens
        self.tokens = (self.tokens + elapsed * self.requests_per_second as f64)
            .min(self.requests_per_second as f64);

        if self.tokens < 1.0 {
            let wait_time = (1.0 - self.tokens) / self.requests_per_second as f64;
            tokio::time::sleep(Duration::from_secs_f64(wait_time)).await;
            self.tokens = 1.0;
        }

        self.tokens -= 1.0;
        self.last_request = std::time::Instant::now();

        Ok(())
    }
}
