//! Periodic evaluation loop: sweep expired triggers, fetch a quote per
//! distinct symbol with bounded fan-out, then fan out a dispatch attempt
//! for every active trigger whose quote is in hand.
//!
//! Grounded on `PriceMonitorService._monitor_loop` /
//! `_check_all_triggers` / `_fetch_prices` in
//! `original_source/src/core/price_monitor.py`: the loop sleeps in short
//! slices so a shutdown signal is noticed quickly rather than waiting out
//! the full interval, and price fetches fan out across a worker pool
//! bounded by `max_quote_workers` instead of fetching serially.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::broker::BrokerPool;
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::model::Trigger;
use crate::quote::{QuoteCache, QuoteSource};
use crate::registry::TriggerRegistry;

const SHUTDOWN_POLL_SLICE: Duration = Duration::from_secs(1);

pub struct Scheduler {
    registry: Arc<TriggerRegistry>,
    dispatcher: Arc<Dispatcher>,
    broker_pool: Arc<BrokerPool>,
    quote_cache: Arc<QuoteCache>,
    quote_source: Arc<dyn QuoteSource>,
    check_interval: Duration,
    max_quote_workers: usize,
}

impl Scheduler {
    pub fn new(
        registry: Arc<TriggerRegistry>,
        dispatcher: Arc<Dispatcher>,
        broker_pool: Arc<BrokerPool>,
        quote_cache: Arc<QuoteCache>,
        quote_source: Arc<dyn QuoteSource>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            broker_pool,
            quote_cache,
            quote_source,
            check_interval: Duration::from_secs(config.check_interval_secs),
            max_quote_workers: config.max_quote_workers,
        }
    }

    /// Runs until `shutdown` is set to `true`. Sleeps in one-second slices
    /// between rounds so shutdown is observed promptly rather than at the
    /// next multi-second boundary.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.check_interval.as_secs(), "scheduler starting");
        loop {
            if let Err(e) = self.check_all_triggers().await {
                warn!(error = %e, "scheduler round failed");
            }

            let mut slept = Duration::ZERO;
            while slept < self.check_interval {
                if *shutdown.borrow() {
                    info!("scheduler stopping");
                    return;
                }
                let slice = SHUTDOWN_POLL_SLICE.min(self.check_interval - slept);
                tokio::select! {
                    _ = tokio::time::sleep(slice) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("scheduler stopping");
                            return;
                        }
                    }
                }
                slept += slice;
            }
        }
    }

    /// One evaluation round, callable directly by an operator ("force a
    /// check now") or by the periodic loop.
    #[instrument(skip(self))]
    pub async fn check_all_triggers(&self) -> anyhow::Result<()> {
        self.broker_pool.maintain().await;
        self.quote_cache.maintain();

        let swept = self.registry.sweep_expired()?;
        if swept > 0 {
            debug!(swept, "swept expired triggers before evaluation");
        }

        let active = self.registry.list_active_all_tenants()?;
        if active.is_empty() {
            return Ok(());
        }

        let quotes = self.fetch_quotes(&active).await;

        let mut dispatches = JoinSet::new();
        for trigger in active {
            let Some(&last_price) = quotes.get(&trigger.symbol) else {
                continue;
            };
            let dispatcher = self.dispatcher.clone();
            let tenant_id = trigger.tenant_id.clone();
            let trigger_id = trigger.id.clone();
            dispatches.spawn(async move {
                if let Err(e) = dispatcher.execute(&tenant_id, &trigger_id, last_price).await {
                    warn!(trigger_id, error = %e, "dispatch attempt failed");
                }
            });
        }
        while dispatches.join_next().await.is_some() {}

        Ok(())
    }

    /// Fetches one quote per distinct symbol among `triggers`, checking the
    /// cache first and fanning fetches out across at most
    /// `max_quote_workers` concurrent calls to the quote source.
    async fn fetch_quotes(&self, triggers: &[Trigger]) -> HashMap<String, f64> {
        let mut symbols: Vec<String> = triggers.iter().map(|t| t.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();

        let mut out = HashMap::with_capacity(symbols.len());
        let mut to_fetch = Vec::new();
        for symbol in symbols {
            if let Some(quote) = self.quote_cache.get(&symbol) {
                out.insert(symbol, quote.last_price);
            } else {
                to_fetch.push(symbol);
            }
        }

        if to_fetch.is_empty() {
            return out;
        }

        let semaphore = Arc::new(Semaphore::new(self.max_quote_workers));
        let mut fetches = JoinSet::new();
        for symbol in to_fetch {
            let semaphore = semaphore.clone();
            let quote_source = self.quote_source.clone();
            fetches.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let price = quote_source.fetch(&symbol).await;
                (symbol, price)
            });
        }

        while let Some(joined) = fetches.join_next().await {
            match joined {
                Ok((symbol, Ok(price))) => {
                    self.quote_cache.put(&symbol, crate::model::Quote::new(price));
                    out.insert(symbol, price);
                }
                Ok((symbol, Err(e))) => warn!(symbol, error = %e, "quote fetch failed"),
                Err(e) => warn!(error = %e, "quote fetch task panicked"),
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::stub::StubBroker;
    use crate::error::{EngineError, EngineResult};
    use crate::model::{OrderAction, OrderKind, TradeClass, TriggerCondition, TriggerStatus};
    use crate::notifier::NoopNotifier;
    use crate::store::{FileStore, Store};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedQuoteSource {
        price: f64,
        calls: AtomicU32,
    }

    #[async_trait]
    impl QuoteSource for FixedQuoteSource {
        async fn fetch(&self, _symbol: &str) -> EngineResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.price)
        }
    }

    struct FailingQuoteSource;

    #[async_trait]
    impl QuoteSource for FailingQuoteSource {
        async fn fetch(&self, symbol: &str) -> EngineResult<f64> {
            Err(EngineError::QuoteUnavailable(symbol.to_string()))
        }
    }

    fn config(dir: &std::path::Path) -> Config {
        Config {
            base_dir: dir.to_path_buf(),
            check_interval_secs: 30,
            quote_ttl_secs: 10,
            max_quote_workers: 5,
            broker_session_ttl_secs: 1800,
            broker_session_max: 50,
            lock_timeout_secs: 2,
            cond_eps: 0.01,
            retention_days: 90,
        }
    }

    #[tokio::test]
    async fn round_executes_a_trigger_whose_condition_is_met() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path(), 2));
        let registry = Arc::new(TriggerRegistry::new(store));
        let mut pool = BrokerPool::new(1800, 50);
        pool.register_broker("esun", |_| Arc::new(StubBroker::new("esun")));
        let pool = Arc::new(pool);
        let cfg = config(dir.path());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            pool.clone(),
            Arc::new(NoopNotifier),
            &cfg,
        ));
        let quote_cache = Arc::new(QuoteCache::new(cfg.quote_ttl_secs));
        let quote_source: Arc<dyn QuoteSource> = Arc::new(FixedQuoteSource {
            price: 200.0,
            calls: AtomicU32::new(0),
        });
        let scheduler = Scheduler::new(registry.clone(), dispatcher, pool, quote_cache, quote_source, &cfg);

        let trigger = registry
            .create(
                "tenant-1",
                "AAPL",
                TriggerCondition::Ge,
                190.0,
                OrderAction::Buy,
                OrderKind::Market,
                TradeClass::Cash,
                10,
                None,
                "esun",
                None,
            )
            .unwrap();

        scheduler.check_all_triggers().await.unwrap();

        let fetched = registry.get("tenant-1", &trigger.id).unwrap();
        assert!(matches!(fetched.status, TriggerStatus::Executed));
    }

    #[tokio::test]
    async fn quote_fetch_failure_does_not_crash_the_round() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path(), 2));
        let registry = Arc::new(TriggerRegistry::new(store));
        let mut pool = BrokerPool::new(1800, 50);
        pool.register_broker("esun", |_| Arc::new(StubBroker::new("esun")));
        let pool = Arc::new(pool);
        let cfg = config(dir.path());
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            pool.clone(),
            Arc::new(NoopNotifier),
            &cfg,
        ));
        let quote_cache = Arc::new(QuoteCache::new(cfg.quote_ttl_secs));
        let scheduler = Scheduler::new(
            registry.clone(),
            dispatcher,
            pool,
            quote_cache,
            Arc::new(FailingQuoteSource),
            &cfg,
        );

        let trigger = registry
            .create(
                "tenant-1",
                "AAPL",
                TriggerCondition::Ge,
                190.0,
                OrderAction::Buy,
                OrderKind::Market,
                TradeClass::Cash,
                10,
                None,
                "esun",
                None,
            )
            .unwrap();

        scheduler.check_all_triggers().await.unwrap();

        let fetched = registry.get("tenant-1", &trigger.id).unwrap();
        assert!(matches!(fetched.status, TriggerStatus::Active));
    }
}
