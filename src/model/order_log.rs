//! Append-only execution history for a trigger (`trigger_logs/{id}.jsonl`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Created,
    Updated,
    Triggered,
    Executed,
    Failed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLog {
    pub trigger_id: String,
    pub tenant_id: String,
    pub action: LogAction,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl OrderLog {
    pub fn new(
        trigger_id: impl Into<String>,
        tenant_id: impl Into<String>,
        action: LogAction,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            trigger_id: trigger_id.into(),
            tenant_id: tenant_id.into(),
            action,
            detail: detail.into(),
            at: Utc::now(),
        }
    }
}
