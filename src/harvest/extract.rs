use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info, warn};

use super::identity::{self, ConversationRecord};
use crate::page::{NodeHandle, Page};
use crate::selectors as sel;

/// Per-pass tallies, logged at the end of extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub containers: usize,
    pub extracted: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub unmatched: usize,
}

/// The records seen during one pipeline run, de-duplicated by `(title, url)`.
#[derive(Debug, Default)]
pub struct ScrapeSession {
    pub batch: Vec<ConversationRecord>,
    seen: HashSet<(String, String)>,
    pub stats: ExtractStats,
}

impl ScrapeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record unless the same `(title, url)` is already in the batch.
    pub fn insert(&mut self, record: ConversationRecord) -> bool {
        let key = (record.title.clone(), record.url.clone());
        if !self.seen.insert(key) {
            debug!("Duplicate conversation skipped: {} ({})", record.title, record.url);
            self.stats.duplicates += 1;
            return false;
        }
        self.batch.push(record);
        self.stats.extracted += 1;
        true
    }
}

/// Walk the rendered item containers under `list` and collect their records.
pub async fn extract_batch<P: Page + ?Sized>(
    page: &P,
    list: NodeHandle,
    session: &mut ScrapeSession,
) -> Result<()> {
    let containers = page.query_all(Some(list), sel::ITEM_CONTAINER).await?;
    info!("Found {} conversation item containers", containers.len());
    session.stats.containers += containers.len();

    for container in containers {
        let Some(item) = page.query(Some(container), sel::CONVERSATION_ITEM).await? else {
            warn!("Item container {} has no conversation node", container.0);
            session.stats.malformed += 1;
            continue;
        };
        let Some(title_node) = page.query(Some(item), sel::CONVERSATION_TITLE).await? else {
            warn!("Conversation node {} has no title", item.0);
            session.stats.malformed += 1;
            continue;
        };
        let Some(token) = page.attribute(item, sel::METADATA_ATTR).await? else {
            warn!("Conversation node {} has no metadata token", item.0);
            session.stats.malformed += 1;
            continue;
        };

        let title = page.text(title_node).await?;
        match identity::extract(&token, &title) {
            Some(record) => {
                debug!("Extracted {:?} -> {}", record.title, record.url);
                session.insert(record);
            }
            None => {
                warn!("Could not extract chat id from token {:?}", token);
                session.stats.unmatched += 1;
            }
        }
    }

    info!(
        "Extracted {} conversations ({} duplicates, {} malformed, {} unmatched)",
        session.stats.extracted,
        session.stats.duplicates,
        session.stats.malformed,
        session.stats.unmatched
    );
    Ok(())
}
