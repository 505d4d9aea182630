//! Retention cleanup for triggers that have reached a terminal state.
//!
//! Grounded on `TriggerOrderManager.cleanup_old_triggers` in
//! `original_source/src/core/trigger_order_manager.py`. Left manual rather
//! than scheduled: an operator (or a cron invoking the binary with a
//! one-shot flag) decides when retention cleanup runs, the same way the
//! Python original exposes it as a method callable on demand rather than
//! wiring it into its own periodic loop.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use crate::error::EngineResult;
use crate::store::Store;

pub struct Janitor {
    store: Arc<dyn Store>,
    retention: Duration,
}

impl Janitor {
    pub fn new(store: Arc<dyn Store>, retention_days: i64) -> Self {
        Self {
            store,
            retention: Duration::days(retention_days),
        }
    }

    /// Deletes every terminal-state trigger (and its log stream) whose
    /// terminal transition happened longer ago than the retention window.
    /// Returns the number of triggers removed.
    pub fn sweep(&self) -> EngineResult<usize> {
        let cutoff = Utc::now() - self.retention;
        let mut removed = 0;

        for tenant_id in self.tenant_ids()? {
            for trigger in self.store.list_triggers(&tenant_id)? {
                if !trigger.status.is_terminal() {
                    continue;
                }
                let terminal_at = trigger
                    .executed_at
                    .or(trigger.triggered_at)
                    .unwrap_or(trigger.created_at);
                if terminal_at >= cutoff {
                    continue;
                }
                self.store.delete_trigger(&tenant_id, &trigger.id)?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "janitor sweep removed retired triggers");
        }
        Ok(removed)
    }

    fn tenant_ids(&self) -> EngineResult<Vec<String>> {
        self.store.list_tenant_ids()
    }
}
