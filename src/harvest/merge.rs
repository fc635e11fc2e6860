use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::identity::ConversationRecord;

/// The persisted store as exchanged with readers: records keyed by canonical URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub records: BTreeMap<String, ConversationRecord>,
    pub last_updated: Option<String>,
}

impl StoreSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Overlay `batch` onto `stored` by URL. New URLs are inserted, colliding
/// URLs take the batch's record whole; nothing is ever removed.
pub fn merge(
    stored: &BTreeMap<String, ConversationRecord>,
    batch: &[ConversationRecord],
) -> BTreeMap<String, ConversationRecord> {
    let mut merged = stored.clone();
    for record in batch {
        merged.insert(record.url.clone(), record.clone());
    }
    merged
}
