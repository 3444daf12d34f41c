//! The spot-price feed the quoter consults before falling back to fixed defaults.
//! Modeled as a narrow trait the same way `wallet::daemon_api::DaemonAPI` wraps its
//! RPC transport: callers never see `reqwest` directly.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy)]
pub struct PriceSnapshot {
    pub sui_usd: f64,
    pub wal_usd: f64,
    pub fallback: bool,
}

#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("price feed request timed out")]
    Timeout,
    #[error("price feed request failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn spot_prices(&self) -> Result<PriceSnapshot, PriceFeedError>;
}

/// Production feed: a single HTTP GET against a configured price endpoint, with a
/// 3s timeout per §4.1.
pub struct ReqwestPriceFeed {
    endpoint: String,
    client: reqwest::Client,
}

impl ReqwestPriceFeed {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(3))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
        }
    }
}

#[derive(serde::Deserialize)]
struct RawPrices {
    sui: f64,
    wal: f64,
}

#[async_trait]
impl PriceFeed for ReqwestPriceFeed {
    async fn spot_prices(&self) -> Result<PriceSnapshot, PriceFeedError> {
        let response = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { PriceFeedError::Timeout } else { PriceFeedError::Transport(e.to_string()) })?;

        let raw: RawPrices = response
            .json()
            .await
            .map_err(|e| PriceFeedError::Transport(e.to_string()))?;

        Ok(PriceSnapshot { sui_usd: raw.sui, wal_usd: raw.wal, fallback: false })
    }
}

/// A fixed snapshot, for tests and for explicit caller-supplied price overrides.
pub struct FixedPriceFeed(pub PriceSnapshot);

#[async_trait]
impl PriceFeed for FixedPriceFeed {
    async fn spot_prices(&self) -> Result<PriceSnapshot, PriceFeedError> {
        Ok(self.0)
    }
}
