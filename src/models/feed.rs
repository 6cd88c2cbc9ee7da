//! Feed revision information for change detection.

use serde::{Deserialize, Serialize};

/// Clients poll this instead of holding a realtime subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
