//! An in-memory broker used by tests in place of a real venue integration
//! (analogous to the Python original's esun stub used in its own test
//! suite).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::{EngineError, EngineResult};
use crate::model::Trigger;

use super::{BrokerAdapter, OrderResult};

pub struct StubBroker {
    name: String,
    logged_in: AtomicBool,
    next_order_id: AtomicU64,
    logout_count: AtomicU64,
    reject_all: bool,
    supports_market: bool,
}

impl StubBroker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logged_in: AtomicBool::new(false),
            next_order_id: AtomicU64::new(1),
            logout_count: AtomicU64::new(0),
            reject_all: false,
            supports_market: true,
        }
    }

    /// Number of completed `logout` calls, for tests asserting a session
    /// was logged out exactly once over its lifetime.
    pub fn logout_count(&self) -> u64 {
        self.logout_count.load(Ordering::SeqCst)
    }

    pub fn rejecting(mut self) -> Self {
        self.reject_all = true;
        self
    }

    pub fn without_market_orders(mut self) -> Self {
        self.supports_market = false;
        self
    }

    fn next_id(&self) -> String {
        format!("stub-{}", self.next_order_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl BrokerAdapter for StubBroker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn login(&self, _tenant_id: &str) -> EngineResult<()> {
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_logged_in(&self, _tenant_id: &str) -> EngineResult<bool> {
        Ok(self.logged_in.load(Ordering::SeqCst))
    }

    async fn logout(&self, _tenant_id: &str) -> EngineResult<()> {
        self.logged_in.store(false, Ordering::SeqCst);
        self.logout_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn place_limit_buy(&self, _tenant_id: &str, trigger: &Trigger) -> EngineResult<OrderResult> {
        if self.reject_all {
            return Err(EngineError::BrokerRejected("stub configured to reject".into()));
        }
        Ok(OrderResult {
            broker_order_id: self.next_id(),
            filled_quantity: trigger.quantity as f64,
            avg_price: trigger.limit_price,
        })
    }

    async fn place_limit_sell(&self, _tenant_id: &str, trigger: &Trigger) -> EngineResult<OrderResult> {
        self.place_limit_buy(_tenant_id, trigger).await
    }

    async fn place_market_buy(&self, tenant_id: &str, trigger: &Trigger) -> EngineResult<OrderResult> {
        if !self.supports_market {
            return Err(EngineError::Unsupported(format!(
                "{} does not support market buy orders",
                self.name
            )));
        }
        if self.reject_all {
            return Err(EngineError::BrokerRejected("stub configured to reject".into()));
        }
        let _ = tenant_id;
        Ok(OrderResult {
            broker_order_id: self.next_id(),
            filled_quantity: trigger.quantity as f64,
            avg_price: None,
        })
    }

    async fn place_market_sell(&self, tenant_id: &str, trigger: &Trigger) -> EngineResult<OrderResult> {
        self.place_market_buy(tenant_id, trigger).await
    }
}
