//! Placeholder quote source for the shipped binary: no market-data vendor
//! integration is part of this crate, so prices are read from environment
//! variables (`TOE_QUOTE_<SYMBOL>`) until a real adapter is wired in. Tests
//! and the library itself use `QuoteSource` implementations of their own.

use async_trait::async_trait;

use trigger_order_engine::error::{EngineError, EngineResult};

pub struct ManualQuoteSource;

impl ManualQuoteSource {
    pub fn from_env() -> Self {
        Self
    }
}

#[async_trait]
impl trigger_order_engine::quote::QuoteSource for ManualQuoteSource {
    async fn fetch(&self, symbol: &str) -> EngineResult<f64> {
        let var = format!("TOE_QUOTE_{}", symbol.to_uppercase());
        std::env::var(&var)
            .ok()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| EngineError::QuoteUnavailable(symbol.to_string()))
    }
}
