//! The trigger order: a standing instruction to place an order once a
//! symbol's price satisfies a condition against a threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

const MIN_QUANTITY: u32 = 1;
const MAX_QUANTITY: u32 = 999;

/// Relation a symbol's last price must satisfy against `trigger_price`.
/// Serialized as the relational symbol itself, matching the documented
/// wire/on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerCondition {
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
}

impl TriggerCondition {
    /// `eps` is an absolute tolerance, applied only to `Eq` (§6.5 `COND_EPS`).
    pub fn is_met(self, last_price: f64, trigger_price: f64, eps: f64) -> bool {
        match self {
            TriggerCondition::Ge => last_price >= trigger_price,
            TriggerCondition::Le => last_price <= trigger_price,
            TriggerCondition::Eq => (last_price - trigger_price).abs() <= eps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeClass {
    Cash,
    DayTrade,
    MarginBuy,
    ShortSell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Triggered,
    Executed,
    Failed,
    Cancelled,
    Expired,
}

impl TriggerStatus {
    /// Terminal statuses never transition further (§4.2, §8 invariant 1).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TriggerStatus::Executed
                | TriggerStatus::Failed
                | TriggerStatus::Cancelled
                | TriggerStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub tenant_id: String,
    pub symbol: String,
    pub condition: TriggerCondition,
    pub trigger_price: f64,
    pub action: OrderAction,
    pub order_kind: OrderKind,
    pub trade_class: TradeClass,
    pub quantity: u32,
    pub limit_price: Option<f64>,
    pub broker: String,
    pub status: TriggerStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub broker_order_ref: Option<String>,
    pub execution_message: Option<String>,
}

/// Fields `update` may change; `None` leaves the corresponding field as is.
#[derive(Debug, Clone, Default)]
pub struct TriggerPatch {
    pub trigger_price: Option<f64>,
    pub limit_price: Option<Option<f64>>,
    pub quantity: Option<u32>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub note: Option<Option<String>>,
}

fn validate_quantity(quantity: u32) -> EngineResult<()> {
    if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
        return Err(EngineError::Validation(format!(
            "quantity must be between {MIN_QUANTITY} and {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

impl Trigger {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: impl Into<String>,
        symbol: impl Into<String>,
        condition: TriggerCondition,
        trigger_price: f64,
        action: OrderAction,
        order_kind: OrderKind,
        trade_class: TradeClass,
        quantity: u32,
        limit_price: Option<f64>,
        broker: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> EngineResult<Self> {
        validate_quantity(quantity)?;
        if order_kind == OrderKind::Limit && limit_price.is_none() {
            return Err(EngineError::Validation(
                "limit orders require a limit_price".to_string(),
            ));
        }
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(EngineError::Validation("symbol must not be empty".to_string()));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            symbol,
            condition,
            trigger_price,
            action,
            order_kind,
            trade_class,
            quantity,
            limit_price,
            broker: broker.into(),
            status: TriggerStatus::Active,
            note: None,
            created_at: now,
            updated_at: now,
            expires_at,
            triggered_at: None,
            executed_at: None,
            broker_order_ref: None,
            execution_message: None,
        })
    }

    pub fn is_condition_met(&self, last_price: f64, eps: f64) -> bool {
        self.condition.is_met(last_price, self.trigger_price, eps)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }

    pub fn can_transition_to(&self, next: TriggerStatus) -> bool {
        use TriggerStatus::*;
        match (self.status, next) {
            (Active, Triggered) | (Active, Cancelled) | (Active, Expired) => true,
            (Triggered, Executed) | (Triggered, Failed) => true,
            _ => false,
        }
    }

    /// Applies `patch`, validating the result and bumping `updated_at`.
    /// Only legal on an `Active` trigger — anything already `Triggered` or
    /// terminal can no longer be edited.
    pub fn apply_patch(&mut self, patch: TriggerPatch) -> EngineResult<()> {
        if !matches!(self.status, TriggerStatus::Active) {
            return Err(EngineError::IllegalTransition(format!(
                "cannot update trigger in status {:?}",
                self.status
            )));
        }

        let quantity = patch.quantity.unwrap_or(self.quantity);
        validate_quantity(quantity)?;
        let limit_price = patch.limit_price.unwrap_or(self.limit_price);
        let order_kind = self.order_kind;
        if order_kind == OrderKind::Limit && limit_price.is_none() {
            return Err(EngineError::Validation(
                "limit orders require a limit_price".to_string(),
            ));
        }

        if let Some(trigger_price) = patch.trigger_price {
            self.trigger_price = trigger_price;
        }
        self.limit_price = limit_price;
        self.quantity = quantity;
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(note) = patch.note {
            self.note = note;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}
