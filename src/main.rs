use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trigger_order_engine::broker::stub::StubBroker;
use trigger_order_engine::broker::BrokerPool;
use trigger_order_engine::config::{Cli, Config};
use trigger_order_engine::notifier::NoopNotifier;
use trigger_order_engine::quote::QuoteCache;
use trigger_order_engine::store::{FileStore, Store};
use trigger_order_engine::{Dispatcher, Scheduler, TriggerRegistry};

mod manual_quote_source;
use manual_quote_source::ManualQuoteSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().with_cli_overrides(&cli);
    info!(base_dir = %config.base_dir.display(), "starting trigger order engine");

    std::fs::create_dir_all(&config.base_dir)?;
    let store: Arc<dyn Store> = Arc::new(FileStore::new(&config.base_dir, config.lock_timeout_secs));
    let registry = Arc::new(TriggerRegistry::new(store));

    // No real brokerage integration ships with this crate — every broker
    // call is answered by an in-process stub until an adapter is wired in.
    let mut broker_pool = BrokerPool::new(config.broker_session_ttl_secs, config.broker_session_max);
    broker_pool.register_broker("esun", |_tenant_id| Arc::new(StubBroker::new("esun")));
    let broker_pool = Arc::new(broker_pool);

    let notifier = Arc::new(NoopNotifier);
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        broker_pool.clone(),
        notifier,
        &config,
    ));

    let quote_cache = Arc::new(QuoteCache::new(config.quote_ttl_secs));
    let quote_source = Arc::new(ManualQuoteSource::from_env());

    let broker_pool_for_shutdown = broker_pool.clone();
    let scheduler = Scheduler::new(
        registry,
        dispatcher,
        broker_pool,
        quote_cache,
        quote_source,
        &config,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    if shutdown_tx.send(true).is_err() {
        warn!("scheduler already stopped before shutdown was requested");
    }
    scheduler_handle.await?;
    broker_pool_for_shutdown.shutdown_all().await;

    info!("trigger order engine stopped");
    Ok(())
}
