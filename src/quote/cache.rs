//! Last-quote-by-symbol cache with a short TTL, grounded on the price cache
//! in `original_source/src/core/price_monitor.py` (`_fetch_prices`'s
//! per-symbol cache check, `_cleanup_expired_cache`'s 6x-TTL sweep).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use crate::model::Quote;

/// Cached entries older than `6 * ttl` are swept away; the sweep itself is
/// throttled to at most once per `MAINTENANCE_THROTTLE_SECS`, matching the
/// Python original's "don't sweep every round" guard.
const STALE_MULTIPLE: i64 = 6;
const MAINTENANCE_THROTTLE_SECS: i64 = 60;

pub struct QuoteCache {
    ttl_secs: i64,
    entries: Mutex<HashMap<String, Quote>>,
    last_maintained_epoch: AtomicI64,
}

impl QuoteCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs: ttl_secs as i64,
            entries: Mutex::new(HashMap::new()),
            last_maintained_epoch: AtomicI64::new(0),
        }
    }

    /// Returns a cached quote if it's within TTL, otherwise `None`.
    pub fn get(&self, symbol: &str) -> Option<Quote> {
        let entries = self.entries.lock();
        let quote = entries.get(symbol)?;
        if quote.age_secs(Utc::now()) < self.ttl_secs {
            Some(*quote)
        } else {
            None
        }
    }

    pub fn put(&self, symbol: &str, quote: Quote) {
        self.entries.lock().insert(symbol.to_string(), quote);
    }

    /// Sweeps entries older than `STALE_MULTIPLE * ttl`, throttled to once
    /// per `MAINTENANCE_THROTTLE_SECS`. Safe to call every scheduler round.
    pub fn maintain(&self) {
        let now = Utc::now();
        let now_epoch = now.timestamp();
        let last = self.last_maintained_epoch.load(Ordering::SeqCst);
        if now_epoch - last < MAINTENANCE_THROTTLE_SECS {
            return;
        }
        self.last_maintained_epoch.store(now_epoch, Ordering::SeqCst);

        let stale_after = self.ttl_secs * STALE_MULTIPLE;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, q| q.age_secs(now) < stale_after);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "quote cache maintenance evicted stale entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_hits_within_ttl() {
        let cache = QuoteCache::new(10);
        cache.put("AAPL", Quote::new(190.0));
        assert!(cache.get("AAPL").is_some());
    }

    #[test]
    fn unknown_symbol_misses() {
        let cache = QuoteCache::new(10);
        assert!(cache.get("AAPL").is_none());
    }

    #[test]
    fn maintain_is_a_no_op_immediately_after_construction() {
        let cache = QuoteCache::new(10);
        cache.put("AAPL", Quote::new(190.0));
        cache.maintain();
        assert_eq!(cache.len(), 1);
    }
}
