//! The trigger lifecycle: creation, cancellation, status transitions, and
//! the expiry sweep. Every mutation is paired with an append to the
//! trigger's log stream, grounded on how `TriggerOrderManager` in
//! `original_source/src/core/trigger_order_manager.py` always writes an
//! `OrderLog` alongside a status change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::error::{EngineError, EngineResult};
use crate::model::{
    LogAction, OrderAction, OrderKind, OrderLog, TradeClass, Trigger, TriggerCondition, TriggerPatch, TriggerStatus,
};
use crate::store::{Store, TenantStats};

pub struct TriggerRegistry {
    store: Arc<dyn Store>,
}

impl TriggerRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, symbol = %symbol))]
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        tenant_id: &str,
        symbol: &str,
        condition: TriggerCondition,
        trigger_price: f64,
        action: OrderAction,
        order_kind: OrderKind,
        trade_class: TradeClass,
        quantity: u32,
        limit_price: Option<f64>,
        broker: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> EngineResult<Trigger> {
        let trigger = Trigger::new(
            tenant_id,
            symbol,
            condition,
            trigger_price,
            action,
            order_kind,
            trade_class,
            quantity,
            limit_price,
            broker,
            expires_at,
        )?;
        self.store.put_trigger(&trigger)?;
        self.store.append_log(&OrderLog::new(
            &trigger.id,
            tenant_id,
            LogAction::Created,
            format!("{symbol} {condition:?} {trigger_price}"),
        ))?;
        info!(trigger_id = %trigger.id, "trigger created");
        Ok(trigger)
    }

    pub fn get(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<Trigger> {
        self.store.get_trigger(tenant_id, trigger_id)
    }

    pub fn list_active(&self, tenant_id: &str) -> EngineResult<Vec<Trigger>> {
        Ok(self
            .store
            .list_triggers(tenant_id)?
            .into_iter()
            .filter(|t| matches!(t.status, TriggerStatus::Active))
            .collect())
    }

    pub fn list_all(&self, tenant_id: &str) -> EngineResult<Vec<Trigger>> {
        self.store.list_triggers(tenant_id)
    }

    /// All `Active` triggers across every tenant, the working set the
    /// scheduler evaluates each round.
    pub fn list_active_all_tenants(&self) -> EngineResult<Vec<Trigger>> {
        self.store.list_active_triggers_all_tenants()
    }

    pub fn tenant_stats(&self, tenant_id: &str) -> EngineResult<TenantStats> {
        self.store.tenant_stats(tenant_id)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, trigger_id = %trigger_id))]
    pub fn cancel(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<Trigger> {
        let mut trigger = self.store.get_trigger(tenant_id, trigger_id)?;
        if !trigger.can_transition_to(TriggerStatus::Cancelled) {
            return Err(EngineError::IllegalTransition(format!(
                "cannot cancel trigger in status {:?}",
                trigger.status
            )));
        }
        trigger.status = TriggerStatus::Cancelled;
        self.store.put_trigger(&trigger)?;
        self.store
            .append_log(&OrderLog::new(trigger_id, tenant_id, LogAction::Cancelled, "cancelled by tenant"))?;
        info!(trigger_id, "trigger cancelled");
        Ok(trigger)
    }

    /// Patches `{triggerPrice, limitPrice, quantity, expiresAt, note}` on an
    /// `Active` trigger (§4.4). Cross-tenant access surfaces as
    /// `NotFound`/`Forbidden` from the store's tenant-scoped lookup;
    /// attempting to patch a trigger that has already left `Active`
    /// surfaces as `IllegalTransition`.
    #[instrument(skip(self, patch), fields(tenant_id = %tenant_id, trigger_id = %trigger_id))]
    pub fn update(&self, tenant_id: &str, trigger_id: &str, patch: TriggerPatch) -> EngineResult<Trigger> {
        let mut patch = Some(patch);
        let trigger = self.store.mutate_trigger(tenant_id, trigger_id, &mut |trigger| {
            let patch = patch.take().expect("mutate_trigger calls its closure at most once");
            trigger.apply_patch(patch)
        })?;
        self.store.append_log(&OrderLog::new(
            trigger_id,
            tenant_id,
            LogAction::Updated,
            format!(
                "trigger_price={} limit_price={:?} quantity={} expires_at={:?}",
                trigger.trigger_price, trigger.limit_price, trigger.quantity, trigger.expires_at
            ),
        ))?;
        info!(trigger_id, "trigger updated");
        Ok(trigger)
    }

    pub fn delete(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<()> {
        self.store.delete_trigger(tenant_id, trigger_id)
    }

    /// Moves every `Active` trigger whose `expires_at` has passed to
    /// `Expired`, logging each one. Returns the number swept.
    #[instrument(skip(self))]
    pub fn sweep_expired(&self) -> EngineResult<usize> {
        let now = Utc::now();
        let mut swept = 0;
        for mut trigger in self.store.list_active_triggers_all_tenants()? {
            if !trigger.is_expired(now) {
                continue;
            }
            trigger.status = TriggerStatus::Expired;
            self.store.put_trigger(&trigger)?;
            self.store.append_log(&OrderLog::new(
                &trigger.id,
                &trigger.tenant_id,
                LogAction::Expired,
                "expired by scheduler sweep",
            ))?;
            swept += 1;
        }
        if swept > 0 {
            info!(swept, "expiry sweep completed");
        }
        Ok(swept)
    }

    /// Called by the Dispatcher once a condition has been observed met;
    /// moves `Active` to `Triggered` so the dispatch step has a durable
    /// record of intent before it talks to a broker.
    pub(crate) fn mark_triggered(&self, trigger: &mut Trigger) -> EngineResult<()> {
        if !trigger.can_transition_to(TriggerStatus::Triggered) {
            return Err(EngineError::IllegalTransition(format!(
                "cannot trigger from status {:?}",
                trigger.status
            )));
        }
        let now = Utc::now();
        trigger.status = TriggerStatus::Triggered;
        trigger.triggered_at = Some(now);
        trigger.updated_at = now;
        self.store.put_trigger(trigger)?;
        self.store.append_log(&OrderLog::new(
            &trigger.id,
            &trigger.tenant_id,
            LogAction::Triggered,
            "condition met",
        ))?;
        Ok(())
    }

    /// `broker_order_ref` is the id the broker assigned the order;
    /// `execution_message` is a short human-readable summary of the fill.
    /// Both land on the durable record so a reloaded `Executed` trigger
    /// carries its execution trailer, not just its log stream.
    pub(crate) fn mark_executed(
        &self,
        trigger: &mut Trigger,
        broker_order_ref: &str,
        execution_message: &str,
    ) -> EngineResult<()> {
        let now = Utc::now();
        trigger.status = TriggerStatus::Executed;
        trigger.executed_at = Some(now);
        trigger.updated_at = now;
        trigger.broker_order_ref = Some(broker_order_ref.to_string());
        trigger.execution_message = Some(execution_message.to_string());
        self.store.put_trigger(trigger)?;
        self.store.append_log(&OrderLog::new(
            &trigger.id,
            &trigger.tenant_id,
            LogAction::Executed,
            execution_message,
        ))?;
        Ok(())
    }

    pub(crate) fn mark_failed(&self, trigger: &mut Trigger, detail: &str) -> EngineResult<()> {
        let now = Utc::now();
        trigger.status = TriggerStatus::Failed;
        trigger.executed_at = Some(now);
        trigger.updated_at = now;
        trigger.execution_message = Some(detail.to_string());
        self.store.put_trigger(trigger)?;
        self.store
            .append_log(&OrderLog::new(&trigger.id, &trigger.tenant_id, LogAction::Failed, detail))?;
        Ok(())
    }
}
