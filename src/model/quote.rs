//! A single last-price observation for a symbol.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub last_price: f64,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(last_price: f64) -> Self {
        Self {
            last_price,
            fetched_at: Utc::now(),
        }
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_seconds().max(0)
    }
}
