//! Turns "a trigger's condition has been observed met" into a placed order,
//! exactly once.
//!
//! Grounded on `TriggerOrderManager.execute_trigger` in
//! `original_source/src/core/trigger_order_manager.py`: an in-memory
//! `in_flight` set (there: `_executing_triggers` + `_executing_lock`) keeps
//! two concurrent callers from dispatching the same trigger twice, and the
//! trigger's durable status is re-read *after* the in-flight guard is taken
//! so a trigger already moved to a terminal state by another process is
//! never re-dispatched.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, instrument, warn};

use crate::broker::BrokerPool;
use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::model::{OrderAction, OrderKind, TriggerStatus};
use crate::notifier::Notifier;
use crate::registry::TriggerRegistry;

pub struct Dispatcher {
    registry: Arc<TriggerRegistry>,
    broker_pool: Arc<BrokerPool>,
    notifier: Arc<dyn Notifier>,
    in_flight: Mutex<HashSet<String>>,
    cond_eps: f64,
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    trigger_id: String,
}

impl<'a> Drop for InFlightGuard<'a> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.trigger_id);
    }
}

impl Dispatcher {
    pub fn new(
        registry: Arc<TriggerRegistry>,
        broker_pool: Arc<BrokerPool>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            broker_pool,
            notifier,
            in_flight: Mutex::new(HashSet::new()),
            cond_eps: config.cond_eps,
        }
    }

    /// Attempts to dispatch `trigger_id` given an observed `last_price`. A
    /// no-op, not an error, if the trigger is already in flight, no longer
    /// active, or the condition no longer holds.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, trigger_id = %trigger_id))]
    pub async fn execute(&self, tenant_id: &str, trigger_id: &str, last_price: f64) -> EngineResult<()> {
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.contains(trigger_id) {
                return Ok(());
            }
            in_flight.insert(trigger_id.to_string());
        }
        let _guard = InFlightGuard {
            set: &self.in_flight,
            trigger_id: trigger_id.to_string(),
        };

        let mut trigger = self.registry.get(tenant_id, trigger_id)?;
        if !matches!(trigger.status, TriggerStatus::Active) {
            return Ok(());
        }
        if !trigger.is_condition_met(last_price, self.cond_eps) {
            return Ok(());
        }

        self.registry.mark_triggered(&mut trigger)?;

        let broker = match self.broker_pool.acquire(tenant_id, &trigger.broker).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "broker unavailable, marking trigger failed");
                self.registry.mark_failed(&mut trigger, &e.to_string())?;
                self.notifier.notify_failed(&trigger, &e.to_string()).await;
                return Err(e);
            }
        };

        let result = match (trigger.action, trigger.order_kind) {
            (OrderAction::Buy, OrderKind::Limit) => broker.place_limit_buy(tenant_id, &trigger).await,
            (OrderAction::Sell, OrderKind::Limit) => broker.place_limit_sell(tenant_id, &trigger).await,
            (OrderAction::Buy, OrderKind::Market) => broker.place_market_buy(tenant_id, &trigger).await,
            (OrderAction::Sell, OrderKind::Market) => broker.place_market_sell(tenant_id, &trigger).await,
        };

        match result {
            Ok(order) => {
                let execution_message = format!("filled_quantity={}", order.filled_quantity);
                self.registry
                    .mark_executed(&mut trigger, &order.broker_order_id, &execution_message)?;
                info!(trigger_id, broker_order_id = %order.broker_order_id, "trigger executed");
                self.notifier.notify_executed(&trigger, &order).await;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "broker rejected order");
                self.registry.mark_failed(&mut trigger, &e.to_string())?;
                self.notifier.notify_failed(&trigger, &e.to_string()).await;
                match e {
                    EngineError::BrokerRejected(_) | EngineError::Unsupported(_) => Ok(()),
                    other => Err(other),
                }
            }
        }
    }
}
