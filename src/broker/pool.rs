//! Lazily-constructed, TTL-evicted broker sessions keyed by
//! `(tenant_id, broker_name)`.
//!
//! Grounded on `_get_broker`/`_cleanup_broker_cache` in
//! `original_source/src/core/trigger_order_manager.py`: sessions are built
//! once per key and reused until idle past `session_ttl`, with a capacity
//! bound evicting the oldest entries first. Construction uses the same
//! double-checked pattern as the teacher's `vault::pool::PooledVault`: take
//! the lock, re-check under it, and only build if still missing, so two
//! concurrent callers for the same key never race a login.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

use super::BrokerAdapter;

type BrokerFactory = Arc<dyn Fn(&str) -> Arc<dyn BrokerAdapter> + Send + Sync>;

struct Session {
    adapter: Arc<dyn BrokerAdapter>,
    last_used: Instant,
}

pub struct BrokerPool {
    factories: HashMap<String, BrokerFactory>,
    sessions: Mutex<HashMap<(String, String), Session>>,
    session_ttl: Duration,
    capacity: usize,
}

impl BrokerPool {
    pub fn new(session_ttl_secs: u64, capacity: usize) -> Self {
        Self {
            factories: HashMap::new(),
            sessions: Mutex::new(HashMap::new()),
            session_ttl: Duration::from_secs(session_ttl_secs),
            capacity,
        }
    }

    pub fn register_broker(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&str) -> Arc<dyn BrokerAdapter> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Returns a session for `(tenant_id, broker_name)`, constructing and
    /// logging in on first use.
    pub async fn acquire(
        &self,
        tenant_id: &str,
        broker_name: &str,
    ) -> EngineResult<Arc<dyn BrokerAdapter>> {
        let key = (tenant_id.to_string(), broker_name.to_string());

        if let Some(adapter) = self.touch_existing(&key).await? {
            return Ok(adapter);
        }

        let factory = self.factories.get(broker_name).ok_or_else(|| {
            EngineError::BrokerUnavailable(format!("no adapter registered for {broker_name}"))
        })?;
        let adapter = factory(tenant_id);
        adapter.login(tenant_id).await?;

        // Re-check under the lock: another task may have built the same
        // session while this one was logging in.
        let evicted = {
            let mut sessions = self.sessions.lock();
            if let Some(existing) = sessions.get_mut(&key) {
                existing.last_used = Instant::now();
                return Ok(existing.adapter.clone());
            }
            let evicted = self.evict_if_full(&mut sessions);
            sessions.insert(
                key,
                Session {
                    adapter: adapter.clone(),
                    last_used: Instant::now(),
                },
            );
            evicted
        };
        if let Some((evicted_key, evicted_adapter)) = evicted {
            Self::logout_evicted(&evicted_key, &evicted_adapter).await;
        }
        info!(tenant_id, broker_name, "constructed new broker session");
        Ok(adapter)
    }

    /// Reuses a cached session only if it is both within TTL and still
    /// logged in (§4.2 step 1) — a session the broker silently dropped is
    /// not reused, it falls through to reconstruction.
    async fn touch_existing(&self, key: &(String, String)) -> EngineResult<Option<Arc<dyn BrokerAdapter>>> {
        let candidate = {
            let mut sessions = self.sessions.lock();
            let session = match sessions.get_mut(key) {
                Some(s) => s,
                None => return Ok(None),
            };
            if session.last_used.elapsed() >= self.session_ttl {
                None
            } else {
                session.last_used = Instant::now();
                Some(session.adapter.clone())
            }
        };
        let Some(adapter) = candidate else {
            return Ok(None);
        };
        if adapter.is_logged_in(&key.0).await? {
            Ok(Some(adapter))
        } else {
            self.sessions.lock().remove(key);
            Ok(None)
        }
    }

    /// Evicts the oldest session if the pool is at capacity and returns it
    /// so the caller can log it out outside the lock.
    fn evict_if_full(
        &self,
        sessions: &mut HashMap<(String, String), Session>,
    ) -> Option<((String, String), Arc<dyn BrokerAdapter>)> {
        if sessions.len() < self.capacity {
            return None;
        }
        let oldest_key = sessions.iter().min_by_key(|(_, s)| s.last_used).map(|(k, _)| k.clone())?;
        let session = sessions.remove(&oldest_key)?;
        debug!(tenant_id = %oldest_key.0, broker = %oldest_key.1, "evicted broker session at capacity");
        Some((oldest_key, session.adapter))
    }

    async fn logout_evicted(key: &(String, String), adapter: &Arc<dyn BrokerAdapter>) {
        if let Err(e) = adapter.logout(&key.0).await {
            warn!(tenant_id = %key.0, broker = %key.1, error = %e, "logout failed for evicted broker session");
        }
    }

    /// Evicts sessions idle past the TTL. The Scheduler calls this inline,
    /// throttled, rather than running a dedicated background task — same
    /// shape as `_cleanup_broker_cache` in the Python original. Logout
    /// happens after the lock is released.
    pub async fn maintain(&self) {
        let ttl = self.session_ttl;
        let expired: Vec<((String, String), Arc<dyn BrokerAdapter>)> = {
            let mut sessions = self.sessions.lock();
            let expired_keys: Vec<(String, String)> = sessions
                .iter()
                .filter(|(_, s)| s.last_used.elapsed() >= ttl)
                .map(|(k, _)| k.clone())
                .collect();
            expired_keys
                .into_iter()
                .filter_map(|k| sessions.remove(&k).map(|s| (k, s.adapter)))
                .collect()
        };
        let evicted = expired.len();
        for (key, adapter) in &expired {
            Self::logout_evicted(key, adapter).await;
        }
        if evicted > 0 {
            debug!(evicted, "broker pool maintenance evicted idle sessions");
        }
    }

    /// Logs out every currently held session. Called once, on engine
    /// shutdown (§4.2: "every entry is logged out").
    pub async fn shutdown_all(&self) {
        let sessions: Vec<((String, String), Arc<dyn BrokerAdapter>)> =
            self.sessions.lock().drain().map(|(k, s)| (k, s.adapter)).collect();
        let count = sessions.len();
        for (key, adapter) in &sessions {
            Self::logout_evicted(key, adapter).await;
        }
        if count > 0 {
            info!(count, "logged out all broker sessions on shutdown");
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
