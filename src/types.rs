/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity an API key resolves to
/// Immutable once resolved; revocation is recorded as a separate negative cache fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyIdentity {
    pub key_id: Uuid,
    pub network_id: Uuid,
    pub gamemode_id: Option<Uuid>,
    pub revoked: bool,
}

impl ApiKeyIdentity {
    pub fn new(key_id: Uuid, network_id: Uuid, gamemode_id: Option<Uuid>) -> Self {
        Self {
            key_id,
            network_id,
            gamemode_id,
            revoked: false,
        }
    }
}
