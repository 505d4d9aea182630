//! One-way, best-effort, at-most-once delivery of trigger outcomes to
//! whatever channel a deployment wants (the original system used a
//! Telegram bot; this crate only ships the trait plus a log-based
//! reference implementation).

use async_trait::async_trait;
use tracing::info;

use crate::broker::OrderResult;
use crate::model::Trigger;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_executed(&self, trigger: &Trigger, result: &OrderResult);
    async fn notify_failed(&self, trigger: &Trigger, reason: &str);
}

/// Delivers notifications as structured log lines. Never fails, never
/// retries — a dropped notification does not get a second attempt, per the
/// at-most-once contract.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_executed(&self, trigger: &Trigger, result: &OrderResult) {
        info!(
            trigger_id = %trigger.id,
            tenant_id = %trigger.tenant_id,
            broker_order_id = %result.broker_order_id,
            "notify: trigger executed"
        );
    }

    async fn notify_failed(&self, trigger: &Trigger, reason: &str) {
        info!(
            trigger_id = %trigger.id,
            tenant_id = %trigger.tenant_id,
            reason,
            "notify: trigger failed"
        );
    }
}
