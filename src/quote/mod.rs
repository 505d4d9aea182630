pub mod cache;

pub use cache::QuoteCache;

use async_trait::async_trait;

use crate::error::EngineResult;

/// Whatever fetches a last-traded price for a symbol. Real deployments
/// implement this against a market-data vendor; tests use a canned source.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> EngineResult<f64>;
}
