pub mod file_store;
pub mod lock;

pub use file_store::FileStore;

use crate::error::EngineResult;
use crate::model::{OrderLog, TenantIdentity, Trigger, TriggerStatus};

/// Aggregate counters across the whole store (`original_source`'s
/// `JsonStorage.get_stats`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub tenant_count: usize,
    pub trigger_count: usize,
    pub active_trigger_count: usize,
    pub log_line_count: usize,
}

/// Per-tenant counters, bucketed by status (`TriggerOrderManager.get_user_stats`).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TenantStats {
    pub active: usize,
    pub triggered: usize,
    pub executed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub expired: usize,
}

/// Durable per-tenant storage contract. A `FileStore` is the only
/// implementation shipped; the trait exists so tests can swap in an
/// in-memory fake without touching a disk.
pub trait Store: Send + Sync {
    fn list_tenant_ids(&self) -> EngineResult<Vec<String>>;

    fn create_tenant(&self, identity: TenantIdentity) -> EngineResult<()>;
    fn get_identity(&self, tenant_id: &str) -> EngineResult<TenantIdentity>;
    fn rotate_api_key(&self, tenant_id: &str) -> EngineResult<String>;
    fn resolve_tenant_by_api_key(&self, api_key: &str) -> EngineResult<String>;

    fn put_trigger(&self, trigger: &Trigger) -> EngineResult<()>;
    fn get_trigger(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<Trigger>;
    fn delete_trigger(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<()>;
    fn list_triggers(&self, tenant_id: &str) -> EngineResult<Vec<Trigger>>;
    fn list_active_triggers_all_tenants(&self) -> EngineResult<Vec<Trigger>>;

    /// Reads, mutates, then writes back a trigger under a single held lock
    /// so two concurrent callers serialize rather than racing a lost
    /// update. `f` is applied to the freshly read record before it is
    /// persisted; its result is propagated without writing on error.
    fn mutate_trigger(
        &self,
        tenant_id: &str,
        trigger_id: &str,
        f: &mut dyn FnMut(&mut Trigger) -> EngineResult<()>,
    ) -> EngineResult<Trigger>;

    fn append_log(&self, log: &OrderLog) -> EngineResult<()>;
    fn read_logs(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<Vec<OrderLog>>;

    fn stats(&self) -> EngineResult<StoreStats>;
    fn tenant_stats(&self, tenant_id: &str) -> EngineResult<TenantStats>;
}

pub fn bucket_tenant_stats(triggers: &[Trigger]) -> TenantStats {
    let mut stats = TenantStats::default();
    for t in triggers {
        match t.status {
            TriggerStatus::Active => stats.active += 1,
            TriggerStatus::Triggered => stats.triggered += 1,
            TriggerStatus::Executed => stats.executed += 1,
            TriggerStatus::Failed => stats.failed += 1,
            TriggerStatus::Cancelled => stats.cancelled += 1,
            TriggerStatus::Expired => stats.expired += 1,
        }
    }
    stats
}
