//! Per-tenant identity: the opaque API key a caller presents and the
//! tenant-scoped config record it lives in (`users/{tenant_id}/config.json`).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const KEY_PREFIX: &str = "toe_live_";
const KEY_ENTROPY_BYTES: usize = 32; // 256 bits

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantIdentity {
    pub tenant_id: String,
    pub api_key: String,
    pub display_name: String,
}

impl TenantIdentity {
    pub fn new(tenant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            api_key: generate_api_key(),
            display_name: display_name.into(),
        }
    }

    /// Atomic rotation happens at the store layer, under the tenant's config
    /// file lock; this just produces the new opaque value.
    pub fn rotate(&mut self) {
        self.api_key = generate_api_key();
    }
}

/// URL-safe, ASCII-prefixed opaque token with at least 256 bits of entropy.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; KEY_ENTROPY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes))
}
