//! Wire-facing descriptor for a site extension as known to the feed and the
//! installed set.

use serde::{Deserialize, Serialize};

use crate::operation_store::OperationRecord;
use crate::operation_store::ProvisioningState;

/// Identity and metadata of an extension; owned by the extension manager
/// except for the operation-tracking fields overlaid from the record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SiteExtensionDescriptor {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_is_latest_version: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<ProvisioningState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SiteExtensionDescriptor {
    /// Placeholder descriptor carrying only the id, used for 404 bodies and
    /// acknowledgement envelopes before any metadata is known.
    pub fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: None,
            summary: None,
            version: None,
            feed_url: None,
            local_path: None,
            local_is_latest_version: None,
            provisioning_state: None,
            comment: None,
        }
    }

    /// Overlays the operation-tracking fields stored in the record.
    pub fn overlay_record(&mut self, record: &OperationRecord) {
        self.provisioning_state = Some(record.provisioning_state);
        self.comment = record.comment.clone();
    }
}
