pub mod pool;
pub mod stub;

pub use pool::BrokerPool;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::model::Trigger;

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub broker_order_id: String,
    pub filled_quantity: f64,
    pub avg_price: Option<f64>,
}

/// The wire contract every broker integration must implement. Market-order
/// methods are `async fn` returning `Unsupported` by default so an adapter
/// that only integrates limit orders doesn't have to stub them out — the
/// Dispatcher fails fast rather than silently downgrading to a limit order.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn login(&self, tenant_id: &str) -> EngineResult<()>;
    async fn is_logged_in(&self, tenant_id: &str) -> EngineResult<bool>;
    async fn logout(&self, tenant_id: &str) -> EngineResult<()>;

    async fn place_limit_buy(&self, tenant_id: &str, trigger: &Trigger) -> EngineResult<OrderResult>;
    async fn place_limit_sell(&self, tenant_id: &str, trigger: &Trigger) -> EngineResult<OrderResult>;

    async fn place_market_buy(&self, tenant_id: &str, trigger: &Trigger) -> EngineResult<OrderResult> {
        let _ = (tenant_id, trigger);
        Err(crate::error::EngineError::Unsupported(format!(
            "{} does not support market buy orders",
            self.name()
        )))
    }

    async fn place_market_sell(&self, tenant_id: &str, trigger: &Trigger) -> EngineResult<OrderResult> {
        let _ = (tenant_id, trigger);
        Err(crate::error::EngineError::Unsupported(format!(
            "{} does not support market sell orders",
            self.name()
        )))
    }
}
