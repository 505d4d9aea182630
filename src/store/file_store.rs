//! File-backed implementation of [`Store`]: one directory per tenant under
//! `base_dir`, JSON records written atomically (temp file + rename), logs
//! appended in JSON-Lines form, all mutation serialized by a named
//! [`FileLock`] scoped to the record being touched.
//!
//! Layout (mirrors `original_source/src/storage/json_storage.py`):
//!
//! ```text
//! {base_dir}/{tenant_id}/config.json
//! {base_dir}/{tenant_id}/triggers/{trigger_id}.json
//! {base_dir}/{tenant_id}/trigger_logs/{trigger_id}.jsonl
//! {base_dir}/{tenant_id}/.locks/
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::{OrderLog, TenantIdentity, Trigger, TriggerStatus};

use super::lock::FileLock;
use super::{bucket_tenant_stats, Store, StoreStats, TenantStats};

pub struct FileStore {
    base_dir: PathBuf,
    lock_timeout_secs: u64,
    api_key_cache: RwLock<HashMap<String, String>>,
}

impl FileStore {
    pub fn new(base_dir: impl AsRef<Path>, lock_timeout_secs: u64) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            lock_timeout_secs,
            api_key_cache: RwLock::new(HashMap::new()),
        }
    }

    fn tenant_dir(&self, tenant_id: &str) -> PathBuf {
        self.base_dir.join(tenant_id)
    }

    fn locks_dir(&self, tenant_id: &str) -> PathBuf {
        self.tenant_dir(tenant_id).join(".locks")
    }

    fn config_path(&self, tenant_id: &str) -> PathBuf {
        self.tenant_dir(tenant_id).join("config.json")
    }

    fn trigger_path(&self, tenant_id: &str, trigger_id: &str) -> PathBuf {
        self.tenant_dir(tenant_id)
            .join("triggers")
            .join(format!("{trigger_id}.json"))
    }

    fn log_path(&self, tenant_id: &str, trigger_id: &str) -> PathBuf {
        self.tenant_dir(tenant_id)
            .join("trigger_logs")
            .join(format!("{trigger_id}.jsonl"))
    }

    fn lock(&self, tenant_id: &str, name: &str) -> EngineResult<FileLock> {
        FileLock::acquire(&self.locks_dir(tenant_id), name, self.lock_timeout_secs)
    }

    fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::StoreCorrupt {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(value).map_err(|e| EngineError::StoreCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(&tmp_path, &body).map_err(|e| EngineError::StoreCorrupt {
            path: tmp_path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::rename(&tmp_path, path).map_err(|e| EngineError::StoreCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> EngineResult<T> {
        let bytes = fs::read(path).map_err(|_| {
            EngineError::NotFound(path.display().to_string())
        })?;
        serde_json::from_slice(&bytes).map_err(|e| EngineError::StoreCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn all_tenant_ids(&self) -> EngineResult<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.base_dir).map_err(|e| EngineError::StoreCorrupt {
            path: self.base_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::StoreCorrupt {
                path: self.base_dir.display().to_string(),
                reason: e.to_string(),
            })?;
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Rebuilds the api-key -> tenant index by scanning every tenant's
    /// config once. Called on a cache miss, same as `json_storage.py`'s
    /// `api_key_cache` rebuild-on-miss strategy.
    fn rebuild_api_key_cache(&self) -> EngineResult<()> {
        let mut fresh = HashMap::new();
        for tenant_id in self.all_tenant_ids()? {
            let path = self.config_path(&tenant_id);
            if !path.exists() {
                continue;
            }
            match Self::read_json::<TenantIdentity>(&path) {
                Ok(identity) => {
                    fresh.insert(identity.api_key, tenant_id);
                }
                Err(e) => warn!(%tenant_id, error = %e, "skipping corrupt tenant config during cache rebuild"),
            }
        }
        *self.api_key_cache.write() = fresh;
        Ok(())
    }
}

impl Store for FileStore {
    fn list_tenant_ids(&self) -> EngineResult<Vec<String>> {
        self.all_tenant_ids()
    }

    fn create_tenant(&self, identity: TenantIdentity) -> EngineResult<()> {
        let _lock = self.lock(&identity.tenant_id, "config")?;
        let path = self.config_path(&identity.tenant_id);
        if path.exists() {
            return Err(EngineError::Validation(format!(
                "tenant {} already exists",
                identity.tenant_id
            )));
        }
        self.api_key_cache
            .write()
            .insert(identity.api_key.clone(), identity.tenant_id.clone());
        Self::write_json_atomic(&path, &identity)
    }

    fn get_identity(&self, tenant_id: &str) -> EngineResult<TenantIdentity> {
        let _lock = self.lock(tenant_id, "config")?;
        Self::read_json(&self.config_path(tenant_id))
    }

    fn rotate_api_key(&self, tenant_id: &str) -> EngineResult<String> {
        let _lock = self.lock(tenant_id, "config")?;
        let mut identity: TenantIdentity = Self::read_json(&self.config_path(tenant_id))?;
        self.api_key_cache.write().remove(&identity.api_key);
        identity.rotate();
        Self::write_json_atomic(&self.config_path(tenant_id), &identity)?;
        self.api_key_cache
            .write()
            .insert(identity.api_key.clone(), tenant_id.to_string());
        Ok(identity.api_key)
    }

    fn resolve_tenant_by_api_key(&self, api_key: &str) -> EngineResult<String> {
        if let Some(tenant_id) = self.api_key_cache.read().get(api_key).cloned() {
            return Ok(tenant_id);
        }
        self.rebuild_api_key_cache()?;
        self.api_key_cache
            .read()
            .get(api_key)
            .cloned()
            .ok_or_else(|| EngineError::Forbidden)
    }

    fn put_trigger(&self, trigger: &Trigger) -> EngineResult<()> {
        let _lock = self.lock(&trigger.tenant_id, &format!("trigger-{}", trigger.id))?;
        Self::write_json_atomic(&self.trigger_path(&trigger.tenant_id, &trigger.id), trigger)
    }

    fn get_trigger(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<Trigger> {
        let trigger: Trigger = Self::read_json(&self.trigger_path(tenant_id, trigger_id))?;
        if trigger.tenant_id != tenant_id {
            return Err(EngineError::Forbidden);
        }
        Ok(trigger)
    }

    fn mutate_trigger(
        &self,
        tenant_id: &str,
        trigger_id: &str,
        f: &mut dyn FnMut(&mut Trigger) -> EngineResult<()>,
    ) -> EngineResult<Trigger> {
        let _lock = self.lock(tenant_id, &format!("trigger-{trigger_id}"))?;
        let mut trigger: Trigger = Self::read_json(&self.trigger_path(tenant_id, trigger_id))?;
        if trigger.tenant_id != tenant_id {
            return Err(EngineError::Forbidden);
        }
        f(&mut trigger)?;
        Self::write_json_atomic(&self.trigger_path(tenant_id, trigger_id), &trigger)?;
        Ok(trigger)
    }

    fn delete_trigger(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<()> {
        let _lock = self.lock(tenant_id, &format!("trigger-{trigger_id}"))?;
        let path = self.trigger_path(tenant_id, trigger_id);
        if !path.exists() {
            return Err(EngineError::NotFound(trigger_id.to_string()));
        }
        fs::remove_file(&path).map_err(|e| EngineError::StoreCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let log_path = self.log_path(tenant_id, trigger_id);
        if log_path.exists() {
            let _ = fs::remove_file(&log_path);
        }
        Ok(())
    }

    fn list_triggers(&self, tenant_id: &str) -> EngineResult<Vec<Trigger>> {
        let dir = self.tenant_dir(tenant_id).join("triggers");
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let entries = fs::read_dir(&dir).map_err(|e| EngineError::StoreCorrupt {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::StoreCorrupt {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_json::<Trigger>(&path) {
                Ok(t) => out.push(t),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping corrupt trigger record"),
            }
        }
        Ok(out)
    }

    fn list_active_triggers_all_tenants(&self) -> EngineResult<Vec<Trigger>> {
        let mut out = Vec::new();
        for tenant_id in self.all_tenant_ids()? {
            for t in self.list_triggers(&tenant_id)? {
                if matches!(t.status, TriggerStatus::Active) {
                    out.push(t);
                }
            }
        }
        Ok(out)
    }

    fn append_log(&self, log: &OrderLog) -> EngineResult<()> {
        let path = self.log_path(&log.tenant_id, &log.trigger_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EngineError::StoreCorrupt {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let line = serde_json::to_string(log).map_err(|e| EngineError::StoreCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EngineError::StoreCorrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        writeln!(file, "{line}").map_err(|e| EngineError::StoreCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        debug!(trigger_id = %log.trigger_id, action = ?log.action, "appended order log");
        Ok(())
    }

    fn read_logs(&self, tenant_id: &str, trigger_id: &str) -> EngineResult<Vec<OrderLog>> {
        let path = self.log_path(tenant_id, trigger_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path).map_err(|e| EngineError::StoreCorrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| EngineError::StoreCorrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<OrderLog>(&line) {
                Ok(log) => out.push(log),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed log line"),
            }
        }
        Ok(out)
    }

    fn stats(&self) -> EngineResult<StoreStats> {
        let mut stats = StoreStats::default();
        for tenant_id in self.all_tenant_ids()? {
            stats.tenant_count += 1;
            let triggers = self.list_triggers(&tenant_id)?;
            stats.trigger_count += triggers.len();
            stats.active_trigger_count += triggers
                .iter()
                .filter(|t| matches!(t.status, TriggerStatus::Active))
                .count();
            for t in &triggers {
                stats.log_line_count += self.read_logs(&tenant_id, &t.id)?.len();
            }
        }
        Ok(stats)
    }

    fn tenant_stats(&self, tenant_id: &str) -> EngineResult<TenantStats> {
        Ok(bucket_tenant_stats(&self.list_triggers(tenant_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogAction, OrderAction, OrderKind, TradeClass, TriggerCondition};

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), 2);
        (dir, store)
    }

    fn sample_trigger(tenant_id: &str) -> Trigger {
        Trigger::new(
            tenant_id,
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
        .unwrap()
    }

    #[test]
    fn round_trips_a_trigger() {
        let (_dir, store) = store();
        let trigger = sample_trigger("tenant-1");
        store.put_trigger(&trigger).unwrap();
        let fetched = store.get_trigger("tenant-1", &trigger.id).unwrap();
        assert_eq!(fetched.symbol, "AAPL");
    }

    #[test]
    fn get_trigger_rejects_cross_tenant_access() {
        let (_dir, store) = store();
        let trigger = sample_trigger("tenant-1");
        store.put_trigger(&trigger).unwrap();
        let err = store.get_trigger("tenant-2", &trigger.id).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)) || matches!(err, EngineError::Forbidden));
    }

    #[test]
    fn delete_is_idempotent_failure_on_second_call() {
        let (_dir, store) = store();
        let trigger = sample_trigger("tenant-1");
        store.put_trigger(&trigger).unwrap();
        store.delete_trigger("tenant-1", &trigger.id).unwrap();
        let err = store.delete_trigger("tenant-1", &trigger.id).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn logs_append_in_order() {
        let (_dir, store) = store();
        let trigger = sample_trigger("tenant-1");
        store
            .append_log(&OrderLog::new(&trigger.id, "tenant-1", LogAction::Created, "created"))
            .unwrap();
        store
            .append_log(&OrderLog::new(&trigger.id, "tenant-1", LogAction::Triggered, "matched"))
            .unwrap();
        let logs = store.read_logs("tenant-1", &trigger.id).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(matches!(logs[0].action, LogAction::Created));
        assert!(matches!(logs[1].action, LogAction::Triggered));
    }

    #[test]
    fn api_key_rotation_invalidates_old_key() {
        let (_dir, store) = store();
        let identity = TenantIdentity::new("tenant-1", "Ada");
        let old_key = identity.api_key.clone();
        store.create_tenant(identity).unwrap();
        assert_eq!(store.resolve_tenant_by_api_key(&old_key).unwrap(), "tenant-1");

        let new_key = store.rotate_api_key("tenant-1").unwrap();
        assert!(store.resolve_tenant_by_api_key(&old_key).is_err());
        assert_eq!(store.resolve_tenant_by_api_key(&new_key).unwrap(), "tenant-1");
    }

    #[test]
    fn tenant_stats_bucket_by_status() {
        let (_dir, store) = store();
        let mut t1 = sample_trigger("tenant-1");
        let mut t2 = sample_trigger("tenant-1");
        t1.status = TriggerStatus::Executed;
        t2.status = TriggerStatus::Active;
        store.put_trigger(&t1).unwrap();
        store.put_trigger(&t2).unwrap();
        let stats = store.tenant_stats("tenant-1").unwrap();
        assert_eq!(stats.executed, 1);
        assert_eq!(stats.active, 1);
    }
}
