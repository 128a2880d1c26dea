//! Order metadata with typed extension points.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Free-form order metadata with the extension points the system itself
/// reads spelled out as fields. Anything else round-trips through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderMetadata {
    /// Machine-readable reason the order was cancelled, e.g. `ABANDONED_CART`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,

    /// Set once the abandoned-cart reminder email has been sent.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reminder_email_sent: bool,

    /// Unrecognized keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl OrderMetadata {
    /// Returns true if no metadata has been recorded.
    pub fn is_empty(&self) -> bool {
        self.cancel_reason.is_none() && !self.reminder_email_sent && self.extra.is_empty()
    }
}
