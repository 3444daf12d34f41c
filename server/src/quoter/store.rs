//! In-memory, single-use quote store with a strict 5-minute TTL (§4.1).

use chrono::Utc;
use dashmap::DashMap;

use super::{Quote, QuoterError};

pub struct QuoteStore {
    quotes: DashMap<String, Quote>,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self { quotes: DashMap::new() }
    }

    pub fn insert(&self, quote: Quote) {
        self.sweep_expired();
        self.quotes.insert(quote.quote_id.clone(), quote);
    }

    /// Removes every expired quote. Run on every read per §4.1.
    fn sweep_expired(&self) {
        let now = Utc::now();
        self.quotes.retain(|_, quote| !quote.is_expired_at(now));
    }

    /// Consumes a quote at most once: returns and atomically removes the record if
    /// present, unexpired, and owned by `user_id`; otherwise `QuoteInvalid`.
    pub fn consume(&self, quote_id: &str, user_id: &str) -> Result<Quote, QuoterError> {
        self.sweep_expired();

        let now = Utc::now();
        let Some((_, quote)) = self.quotes.remove(quote_id) else {
            return Err(QuoterError::Invalid(quote_id.to_string()));
        };

        if quote.is_expired_at(now) || quote.user_id != user_id {
            return Err(QuoterError::Invalid(quote_id.to_string()));
        }

        Ok(quote)
    }
}

impl Default for QuoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quoter::QuoteLineItem;
    use blob_common::Usd;
    use chrono::Duration;

    fn quote(id: &str, user: &str, expires_in: Duration) -> Quote {
        let now = Utc::now();
        Quote {
            quote_id: id.into(),
            user_id: user.into(),
            line_items: vec![QuoteLineItem {
                temp_id: "t1".into(),
                size_mib: 1.0,
                epochs: 3,
                storage_days: None,
                cost_sui: 0.01,
                cost_usd: Usd::MIN_CHARGE,
                fallback_prices: false,
            }],
            total_cost_usd: Usd::MIN_CHARGE,
            total_cost_sui: 0.01,
            created_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn consumes_exactly_once() {
        let store = QuoteStore::new();
        store.insert(quote("q1", "alice", Duration::minutes(5)));

        assert!(store.consume("q1", "alice").is_ok());
        assert!(matches!(store.consume("q1", "alice"), Err(QuoterError::Invalid(_))));
    }

    #[test]
    fn rejects_wrong_user() {
        let store = QuoteStore::new();
        store.insert(quote("q1", "alice", Duration::minutes(5)));
        assert!(matches!(store.consume("q1", "bob"), Err(QuoterError::Invalid(_))));
    }

    #[test]
    fn expired_quotes_never_consume() {
        let store = QuoteStore::new();
        store.insert(quote("q1", "alice", Duration::minutes(-1)));
        assert!(matches!(store.consume("q1", "alice"), Err(QuoterError::Invalid(_))));
    }
}
