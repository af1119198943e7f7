//! HTTP client for image probes and catalog downloads
//!
//! Wraps reqwest with a global rate limiter and implements [`ImageSource`]
//! for the pipeline. Per-task deadlines and cancellation are applied by
//! the probe; the client only enforces the overall request timeout.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client,
    header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::infrastructure::config::HttpConfig;
use crate::pipeline::{ImageSource, RemoteImage, TransportError};

/// Rate-limited reqwest client
pub struct HttpClient {
    client: Client,
    rate_limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    config: HttpConfig,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .default_headers(headers)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to create HTTP client")?;

        // 0 disables rate limiting
        let rate_limiter = NonZeroU32::new(config.max_requests_per_second)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self { client, rate_limiter, config })
    }

    async fn wait_for_slot(&self) {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
    }

    /// Fetch a URL and return its text body, honoring cancellation
    pub async fn get_text(&self, url: &str, cancellation_token: &CancellationToken) -> Result<String> {
        if cancellation_token.is_cancelled() {
            anyhow::bail!("Request cancelled before starting");
        }

        tokio::select! {
            () = self.wait_for_slot() => {},
            () = cancellation_token.cancelled() => {
                anyhow::bail!("Request cancelled during rate limiting");
            }
        }

        debug!("Fetching text from: {}", url);

        let response = tokio::select! {
            result = self.client.get(url).send() => {
                result.with_context(|| format!("Failed to fetch URL: {url}"))?
            },
            () = cancellation_token.cancelled() => {
                warn!("🛑 HTTP request cancelled for URL: {}", url);
                anyhow::bail!("HTTP request cancelled");
            }
        };

        if !response.status().is_success() {
            anyhow::bail!("HTTP request failed with status {}: {}", response.status(), url);
        }

        let text = tokio::select! {
            result = response.text() => {
                result.with_context(|| format!("Failed to read response body from: {url}"))?
            },
            () = cancellation_token.cancelled() => {
                warn!("🛑 Response reading cancelled for URL: {}", url);
                anyhow::bail!("Response reading cancelled");
            }
        };

        debug!("Fetched {} ({} chars)", url, text.len());
        Ok(text)
    }

    /// Get the configuration
    pub const fn config(&self) -> &HttpConfig {
        &self.config
    }
}

#[async_trait]
impl ImageSource for HttpClient {
    async fn head(&self, url: &str) -> Result<u16, TransportError> {
        self.wait_for_slot().await;

        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        debug!("HEAD {} -> {}", url, response.status());
        Ok(response.status().as_u16())
    }

    async fn get(&self, url: &str) -> Result<RemoteImage, TransportError> {
        self.wait_for_slot().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        debug!("GET {} -> {} ({} bytes)", url, status, bytes.len());
        Ok(RemoteImage { status, content_type, bytes })
    }
}
