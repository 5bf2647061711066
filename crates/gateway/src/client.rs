use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Quota, RateLimiter};
use reqwest::Client;
use serde_json::Value;
use trailguard_core::{GatewayConfig, GatewayError};

type DirectLimiter = RateLimiter<governor::state::direct::NotKeyed, InMemoryState, DefaultClock>;

/// Rate-limited HTTP client for the Hyperliquid REST API.
///
/// All calls share one limiter so the process as a whole stays under the
/// venue's request budget, regardless of how many jobs are fetching.
pub struct InfoClient {
    http_client: Client,
    base_url: String,
    rate_limiter: Arc<DirectLimiter>,
}

impl InfoClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        // 1200 requests per minute = 20 per second
        let quota = Quota::per_second(NonZeroU32::new(20).expect("nonzero"));
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.api_url.clone(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// POST to the read-only `/info` endpoint.
    pub async fn info(&self, body: Value) -> Result<Value, GatewayError> {
        self.post("/info", body).await
    }

    /// POST to the `/exchange` endpoint (order placement and closes).
    pub async fn exchange(&self, body: Value) -> Result<Value, GatewayError> {
        self.post("/exchange", body).await
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value, GatewayError> {
        self.rate_limiter.until_ready().await;
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest)?;
        let json = response.json().await.map_err(classify_reqwest)?;
        Ok(json)
    }
}

fn classify_reqwest(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout(error.to_string())
    } else {
        GatewayError::Network(error.to_string())
    }
}
