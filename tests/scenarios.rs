//! End-to-end scenario coverage, mirroring the teacher's
//! `tests/backtest_run_integration.rs` structure: one fixture builder, one
//! `#[tokio::test]` per scenario.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use trigger_order_engine::broker::stub::StubBroker;
use trigger_order_engine::broker::{BrokerAdapter, BrokerPool};
use trigger_order_engine::config::Config;
use trigger_order_engine::dispatcher::Dispatcher;
use trigger_order_engine::error::{EngineError, EngineResult};
use trigger_order_engine::model::{OrderAction, OrderKind, TradeClass, TriggerCondition, TriggerPatch, TriggerStatus};
use trigger_order_engine::notifier::NoopNotifier;
use trigger_order_engine::quote::{QuoteCache, QuoteSource};
use trigger_order_engine::registry::TriggerRegistry;
use trigger_order_engine::scheduler::Scheduler;
use trigger_order_engine::store::{FileStore, Store};

struct FixedQuoteSource {
    price: f64,
}

#[async_trait]
impl QuoteSource for FixedQuoteSource {
    async fn fetch(&self, _symbol: &str) -> EngineResult<f64> {
        Ok(self.price)
    }
}

struct UnavailableQuoteSource;

#[async_trait]
impl QuoteSource for UnavailableQuoteSource {
    async fn fetch(&self, symbol: &str) -> EngineResult<f64> {
        Err(EngineError::QuoteUnavailable(symbol.to_string()))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    registry: Arc<TriggerRegistry>,
    store: Arc<dyn Store>,
    broker_pool: Arc<BrokerPool>,
    config: Config,
}

fn build_harness(broker_factory: impl Fn() -> Arc<StubBroker> + Send + Sync + 'static) -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let store: Arc<dyn Store> = Arc::new(FileStore::new(dir.path(), 2));
    let registry = Arc::new(TriggerRegistry::new(store.clone()));
    let mut pool = BrokerPool::new(1800, 50);
    pool.register_broker("esun", move |_tenant_id| -> Arc<dyn BrokerAdapter> { broker_factory() });
    let config = Config {
        base_dir: dir.path().to_path_buf(),
        check_interval_secs: 30,
        quote_ttl_secs: 10,
        max_quote_workers: 5,
        broker_session_ttl_secs: 1800,
        broker_session_max: 50,
        lock_timeout_secs: 2,
        cond_eps: 0.01,
        retention_days: 90,
    };
    Harness {
        _dir: dir,
        registry,
        store,
        broker_pool: Arc::new(pool),
        config,
    }
}

fn scheduler_for(harness: &Harness, quote_source: Arc<dyn QuoteSource>) -> (Scheduler, Arc<Dispatcher>) {
    let dispatcher = Arc::new(Dispatcher::new(
        harness.registry.clone(),
        harness.broker_pool.clone(),
        Arc::new(NoopNotifier),
        &harness.config,
    ));
    let quote_cache = Arc::new(QuoteCache::new(harness.config.quote_ttl_secs));
    let scheduler = Scheduler::new(
        harness.registry.clone(),
        dispatcher.clone(),
        harness.broker_pool.clone(),
        quote_cache,
        quote_source,
        &harness.config,
    );
    (scheduler, dispatcher)
}

/// S1 — happy path: condition met, market order fills, status reaches Executed.
#[tokio::test]
async fn s1_happy_path_executes_trigger() {
    let harness = build_harness(|| Arc::new(StubBroker::new("esun")));
    let trigger = harness
        .registry
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

    let (scheduler, _dispatcher) = scheduler_for(&harness, Arc::new(FixedQuoteSource { price: 195.0 }));
    scheduler.check_all_triggers().await.unwrap();

    let fetched = harness.registry.get("tenant-1", &trigger.id).unwrap();
    assert!(matches!(fetched.status, TriggerStatus::Executed));
    let logs = harness
        .registry
        .list_all("tenant-1")
        .unwrap()
        .into_iter()
        .find(|t| t.id == trigger.id)
        .unwrap();
    assert_eq!(logs.status, TriggerStatus::Executed);
}

/// S2 — concurrency: two simultaneous dispatch attempts for the same
/// trigger result in exactly one execution.
#[tokio::test]
async fn s2_concurrent_dispatch_is_exactly_once() {
    let harness = build_harness(|| Arc::new(StubBroker::new("esun")));
    let trigger = harness
        .registry
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

    let (_scheduler, dispatcher) = scheduler_for(&harness, Arc::new(FixedQuoteSource { price: 195.0 }));
    let a = dispatcher.clone();
    let b = dispatcher.clone();
    let id_a = trigger.id.clone();
    let id_b = trigger.id.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { a.execute("tenant-1", &id_a, 195.0).await }),
        tokio::spawn(async move { b.execute("tenant-1", &id_b, 195.0).await }),
    );
    r1.unwrap().unwrap();
    r2.unwrap().unwrap();

    let fetched = harness.registry.get("tenant-1", &trigger.id).unwrap();
    assert!(matches!(fetched.status, TriggerStatus::Executed));
}

/// S3 — broker rejection leaves the trigger Failed, not stuck Triggered.
#[tokio::test]
async fn s3_broker_rejection_marks_trigger_failed() {
    let harness = build_harness(|| Arc::new(StubBroker::new("esun").rejecting()));
    let trigger = harness
        .registry
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

    let (scheduler, _dispatcher) = scheduler_for(&harness, Arc::new(FixedQuoteSource { price: 195.0 }));
    scheduler.check_all_triggers().await.unwrap();

    let fetched = harness.registry.get("tenant-1", &trigger.id).unwrap();
    assert!(matches!(fetched.status, TriggerStatus::Failed));
}

/// S4 — expiry sweep moves a past-deadline Active trigger to Expired before
/// it is ever evaluated against a quote.
#[tokio::test]
async fn s4_expiry_sweep_precedes_evaluation() {
    let harness = build_harness(|| Arc::new(StubBroker::new("esun")));
    let past = Utc::now() - Duration::seconds(5);
    let trigger = harness
        .registry
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
            Some(past),
        )
        .unwrap();

    let (scheduler, _dispatcher) = scheduler_for(&harness, Arc::new(FixedQuoteSource { price: 999.0 }));
    scheduler.check_all_triggers().await.unwrap();

    let fetched = harness.registry.get("tenant-1", &trigger.id).unwrap();
    assert!(matches!(fetched.status, TriggerStatus::Expired));
}

/// S5 — two writers call `update` on the same trigger simultaneously, each
/// changing `trigger_price`. Both succeed serially: the final price equals
/// one of the two inputs (not a mix), `updated_at` only ever advances, and
/// the log stream carries two `updated` entries.
#[tokio::test]
async fn s5_lock_contended_concurrent_update_serializes() {
    let harness = build_harness(|| Arc::new(StubBroker::new("esun")));
    let trigger = harness
        .registry
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

    let registry_a = harness.registry.clone();
    let registry_b = harness.registry.clone();
    let id_a = trigger.id.clone();
    let id_b = trigger.id.clone();
    let (r1, r2) = tokio::join!(
        tokio::task::spawn_blocking(move || registry_a.update(
            "tenant-1",
            &id_a,
            TriggerPatch {
                trigger_price: Some(191.0),
                ..Default::default()
            },
        )),
        tokio::task::spawn_blocking(move || registry_b.update(
            "tenant-1",
            &id_b,
            TriggerPatch {
                trigger_price: Some(192.0),
                ..Default::default()
            },
        )),
    );
    r1.unwrap().unwrap();
    r2.unwrap().unwrap();

    let fetched = harness.registry.get("tenant-1", &trigger.id).unwrap();
    assert!(fetched.trigger_price == 191.0 || fetched.trigger_price == 192.0);
    assert!(fetched.updated_at >= trigger.updated_at);

    let logs = harness.store.read_logs("tenant-1", &trigger.id).unwrap();
    let updated_count = logs
        .iter()
        .filter(|l| matches!(l.action, trigger_order_engine::model::LogAction::Updated))
        .count();
    assert_eq!(updated_count, 2);
}

/// S6 — with a short session TTL and a capacity of two, a third distinct
/// `(tenant, broker)` acquisition evicts the oldest session, and the
/// evicted adapter receives exactly one `logout()` call.
#[tokio::test]
async fn s6_session_eviction_logs_out_the_evicted_adapter() {
    let adapters: Arc<parking_lot::Mutex<Vec<Arc<StubBroker>>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = adapters.clone();
    let mut pool = BrokerPool::new(3600, 2);
    pool.register_broker("esun", move |_tenant_id| -> Arc<dyn BrokerAdapter> {
        let adapter = Arc::new(StubBroker::new("esun"));
        recorded.lock().push(adapter.clone());
        adapter
    });

    pool.acquire("tenant-1", "esun").await.unwrap();
    pool.acquire("tenant-2", "esun").await.unwrap();
    assert_eq!(pool.session_count(), 2);

    pool.acquire("tenant-3", "esun").await.unwrap();
    assert!(pool.session_count() <= 2);

    let adapters = adapters.lock();
    let logged_out: u64 = adapters.iter().map(|a| a.logout_count()).sum();
    assert_eq!(logged_out, 1);
    for adapter in adapters.iter() {
        assert!(adapter.logout_count() <= 1);
    }
}

/// S7 — a missing market-order capability fails fast with Unsupported
/// rather than silently falling back to a limit order.
#[tokio::test]
async fn s7_missing_market_capability_fails_fast() {
    let harness = build_harness(|| Arc::new(StubBroker::new("esun").without_market_orders()));
    let trigger = harness
        .registry
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

    let (_scheduler, dispatcher) = scheduler_for(&harness, Arc::new(FixedQuoteSource { price: 195.0 }));
    dispatcher.execute("tenant-1", &trigger.id, 195.0).await.unwrap();

    let fetched = harness.registry.get("tenant-1", &trigger.id).unwrap();
    assert!(matches!(fetched.status, TriggerStatus::Failed));
}

/// S8 — a quote source that can't answer leaves every active trigger
/// untouched rather than erroring the whole round.
#[tokio::test]
async fn s8_quote_unavailable_leaves_triggers_active() {
    let harness = build_harness(|| Arc::new(StubBroker::new("esun")));
    let trigger = harness
        .registry
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

    let (scheduler, _dispatcher) = scheduler_for(&harness, Arc::new(UnavailableQuoteSource));
    scheduler.check_all_triggers().await.unwrap();

    let fetched = harness.registry.get("tenant-1", &trigger.id).unwrap();
    assert!(matches!(fetched.status, TriggerStatus::Active));
}
