//! Fingerprint & Cost Quoter (§4.1): a pure cost function plus a short-lived,
//! single-use quote store.

mod price_feed;
mod store;

pub use price_feed::{FixedPriceFeed, PriceFeed, PriceSnapshot, ReqwestPriceFeed};
pub use store::QuoteStore;

use blob_common::config::{
    DEFAULT_SUI_PRICE_USD, DEFAULT_WAL_PRICE_USD, ENCODED_SIZE_MULTIPLIER, FROST_PER_WAL,
    GAS_COST_SUI, MARGINAL_FROST_PER_MIB_PER_EPOCH, METADATA_WAL_PER_EPOCH, QUOTE_MARKUP,
    QUOTE_TTL, UPLOAD_OVERHEAD_WAL_PER_GIB, WRITE_FEE_FROST_PER_EPOCH,
};
use blob_common::Usd;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuoterError {
    #[error("quote {0} was not found, already consumed, or belongs to a different user")]
    Invalid(String),
}

/// A single file's line item within a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub temp_id: String,
    pub size_mib: f64,
    pub epochs: u32,
    /// Epoch-to-calendar-day conversion belongs to the chain (an external
    /// collaborator, §1); left unset here rather than guessed.
    pub storage_days: Option<u32>,
    pub cost_sui: f64,
    pub cost_usd: Usd,
    pub fallback_prices: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: String,
    pub user_id: String,
    pub line_items: Vec<QuoteLineItem>,
    pub total_cost_usd: Usd,
    pub total_cost_sui: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Quote {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One line item's worth of input to the cost function.
#[derive(Debug, Clone, Copy)]
pub struct QuoteInput {
    pub size_bytes: u64,
    pub epochs: u32,
}

/// Computes the USD/SUI cost for a single file, per §4.1's closed-form cost model.
///
/// Monotonic non-decreasing in `bytes` and in `epochs`; floored at `$0.01`.
pub fn price_one(input: QuoteInput, prices: PriceSnapshot) -> QuoteLineItem {
    let epochs = input.epochs.max(blob_common::config::MIN_EPOCHS);
    let encoded_size = input.size_bytes.saturating_mul(ENCODED_SIZE_MULTIPLIER);
    let units = (encoded_size as f64 / blob_common::config::BYTES_PER_MIB as f64)
        .ceil()
        .max(1.0);

    let metadata_frost = METADATA_WAL_PER_EPOCH * FROST_PER_WAL as f64;
    let per_epoch_frost =
        metadata_frost + WRITE_FEE_FROST_PER_EPOCH as f64 + units * MARGINAL_FROST_PER_MIB_PER_EPOCH as f64;

    let overhead_wal =
        (encoded_size as f64 / blob_common::config::BYTES_PER_GIB as f64) * UPLOAD_OVERHEAD_WAL_PER_GIB;

    let storage_token_frost = per_epoch_frost * epochs as f64 + overhead_wal * FROST_PER_WAL as f64;
    let storage_token_wal = storage_token_frost / FROST_PER_WAL as f64;

    let storage_usd = storage_token_wal * prices.wal_usd;
    let gas_usd = GAS_COST_SUI * prices.sui_usd;

    let total_usd_precise = storage_usd * QUOTE_MARKUP + gas_usd;
    let final_usd = Usd::from_f64(total_usd_precise).floor_at_min_charge();
    let cost_sui = final_usd.to_f64() / prices.sui_usd;

    QuoteLineItem {
        temp_id: String::new(),
        size_mib: input.size_bytes as f64 / blob_common::config::BYTES_PER_MIB as f64,
        epochs,
        storage_days: None,
        cost_sui,
        cost_usd: final_usd,
        fallback_prices: prices.fallback,
    }
}

/// Mints a quote for a set of files for a given user, consulting `feed` for live
/// prices and falling back to fixed defaults on any fetch failure (§4.1).
pub async fn mint_quote(
    quote_id: String,
    user_id: String,
    files: Vec<(String, QuoteInput)>,
    feed: &dyn PriceFeed,
    now: DateTime<Utc>,
) -> Quote {
    let prices = feed.spot_prices().await.unwrap_or(PriceSnapshot {
        sui_usd: DEFAULT_SUI_PRICE_USD,
        wal_usd: DEFAULT_WAL_PRICE_USD,
        fallback: true,
    });

    let mut line_items = Vec::with_capacity(files.len());
    let mut total_usd = Usd::ZERO;
    let mut total_sui = 0.0;

    for (temp_id, input) in files {
        let mut item = price_one(input, prices);
        item.temp_id = temp_id;
        total_usd = total_usd + item.cost_usd;
        total_sui += item.cost_sui;
        line_items.push(item);
    }

    Quote {
        quote_id,
        user_id,
        line_items,
        total_cost_usd: total_usd,
        total_cost_sui: total_sui,
        created_at: now,
        expires_at: now + Duration::from_std(QUOTE_TTL).expect("QUOTE_TTL fits in chrono::Duration"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_prices(sui: f64, wal: f64) -> PriceSnapshot {
        PriceSnapshot { sui_usd: sui, wal_usd: wal, fallback: false }
    }

    #[test]
    fn one_kib_at_given_snapshot_floors_to_one_cent() {
        let item = price_one(QuoteInput { size_bytes: 1024, epochs: 3 }, live_prices(2.00, 0.10));
        assert_eq!(item.cost_usd, Usd::MIN_CHARGE);
        assert!((item.cost_sui - 0.005).abs() < 0.001);
    }

    #[test]
    fn cost_is_monotonic_in_bytes() {
        let prices = live_prices(1.85, 0.15);
        let small = price_one(QuoteInput { size_bytes: 1024, epochs: 3 }, prices);
        let big = price_one(QuoteInput { size_bytes: 50 * 1024 * 1024, epochs: 3 }, prices);
        assert!(big.cost_usd >= small.cost_usd);
    }

    #[test]
    fn cost_is_monotonic_in_epochs() {
        let prices = live_prices(1.85, 0.15);
        let short = price_one(QuoteInput { size_bytes: 10 * 1024 * 1024, epochs: 1 }, prices);
        let long = price_one(QuoteInput { size_bytes: 10 * 1024 * 1024, epochs: 10 }, prices);
        assert!(long.cost_usd >= short.cost_usd);
    }

    #[test]
    fn zero_bytes_one_epoch_still_floors_at_min_charge() {
        let item = price_one(QuoteInput { size_bytes: 0, epochs: 1 }, live_prices(1.85, 0.15));
        assert_eq!(item.cost_usd, Usd::MIN_CHARGE);
    }
}
