pub mod identity;
pub mod order_log;
pub mod quote;
pub mod trigger;

pub use identity::TenantIdentity;
pub use order_log::{LogAction, OrderLog};
pub use quote::Quote;
pub use trigger::{OrderAction, OrderKind, TradeClass, Trigger, TriggerCondition, TriggerPatch, TriggerStatus};
