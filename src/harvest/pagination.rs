use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, info};

use super::identity;
use crate::config::Tuning;
use crate::page::{NodeHandle, Page};
use crate::selectors as sel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Scroll,
    ButtonOnly,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The store is already large enough that only the rendered head is read.
    StoreNearlyComplete,
    /// Enough already-stored conversations showed up again.
    KnownOverlap,
    Stalled,
    RoundLimit,
    /// The disclosure control is labelled something other than "show more".
    EndOfList,
    ButtonMissing,
    ClickLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisclosureReport {
    pub mode: Mode,
    pub rounds: u32,
    pub actuations: u32,
    pub stop: StopReason,
}

/// Reveal as much of the conversation list as is worth reading, bounded by
/// `tuning`. `known` holds the URLs already in the store.
pub async fn disclose<P: Page + ?Sized>(
    page: &P,
    list: NodeHandle,
    known: &HashSet<String>,
    tuning: &Tuning,
) -> Result<DisclosureReport> {
    if known.len() > tuning.stored_skip_threshold {
        info!(
            "Store already holds {} conversations, reading rendered head only",
            known.len()
        );
        return Ok(DisclosureReport {
            mode: Mode::Skipped,
            rounds: 0,
            actuations: 0,
            stop: StopReason::StoreNearlyComplete,
        });
    }

    match scroll_container(page, list, tuning).await? {
        Some(scroller) => scroll_mode(page, list, scroller, known, tuning).await,
        None => {
            debug!("No scrollable ancestor, using show-more button only");
            button_mode(page, list, known, tuning).await
        }
    }
}

/// Nearest overflowing scroll container at or above the list.
async fn scroll_container<P: Page + ?Sized>(
    page: &P,
    list: NodeHandle,
    tuning: &Tuning,
) -> Result<Option<NodeHandle>> {
    let mut node = Some(list);
    for _ in 0..=tuning.max_ancestor_depth {
        let Some(current) = node else { break };
        if let Some(extent) = page.scroll_extent(current).await? {
            if extent.overflows() {
                return Ok(Some(current));
            }
        }
        node = page.parent(current).await?;
    }
    Ok(None)
}

async fn scroll_height<P: Page + ?Sized>(page: &P, node: NodeHandle) -> Result<u64> {
    Ok(page
        .scroll_extent(node)
        .await?
        .unwrap_or_default()
        .scroll_height)
}

async fn scroll_mode<P: Page + ?Sized>(
    page: &P,
    list: NodeHandle,
    scroller: NodeHandle,
    known: &HashSet<String>,
    tuning: &Tuning,
) -> Result<DisclosureReport> {
    let mut stalls = 0u32;
    let mut actuations = 0u32;
    let report = |rounds, actuations, stop| DisclosureReport {
        mode: Mode::Scroll,
        rounds,
        actuations,
        stop,
    };

    for round in 0..tuning.max_scroll_rounds {
        if overlap_reached(page, list, known, tuning).await? {
            info!("Known conversations reached after {} scroll rounds", round);
            return Ok(report(round, actuations, StopReason::KnownOverlap));
        }

        let before = scroll_height(page, scroller).await?;
        page.scroll_to_bottom(scroller).await?;
        tokio::time::sleep(tuning.scroll_settle()).await;

        let mut clicked = false;
        for _ in 0..tuning.show_more_attempts {
            match actionable_show_more(page, list).await? {
                Some(btn) => {
                    page.click(btn).await?;
                    tokio::time::sleep(tuning.show_more_wait()).await;
                    clicked = true;
                    actuations += 1;
                }
                None => break,
            }
        }

        let after = scroll_height(page, scroller).await?;
        if after > before {
            stalls = 0;
        } else if !clicked {
            stalls += 1;
            debug!("Scroll round {} stalled ({}/{})", round + 1, stalls, tuning.stall_threshold);
            if stalls >= tuning.stall_threshold {
                return Ok(report(round + 1, actuations, StopReason::Stalled));
            }
        }
    }

    info!("Scroll round limit ({}) reached", tuning.max_scroll_rounds);
    Ok(report(tuning.max_scroll_rounds, actuations, StopReason::RoundLimit))
}

async fn button_mode<P: Page + ?Sized>(
    page: &P,
    list: NodeHandle,
    known: &HashSet<String>,
    tuning: &Tuning,
) -> Result<DisclosureReport> {
    let mut missing = 0u32;
    let mut clicks = 0u32;
    let mut rounds = 0u32;
    let report = |rounds, clicks, stop| DisclosureReport {
        mode: Mode::ButtonOnly,
        rounds,
        actuations: clicks,
        stop,
    };

    loop {
        rounds += 1;
        let Some(btn) = page.query(Some(list), sel::SHOW_MORE_BUTTON).await? else {
            if missing < tuning.button_missing_attempts {
                missing += 1;
                debug!(
                    "Show-more button not found (attempt {}/{})",
                    missing, tuning.button_missing_attempts
                );
                tokio::time::sleep(tuning.button_retry()).await;
                continue;
            }
            debug!("Show-more button not found after retries, assuming all items shown");
            return Ok(report(rounds, clicks, StopReason::ButtonMissing));
        };
        missing = 0;

        let label = page.text(btn).await?;
        if !sel::is_show_more_label(&label) {
            info!("Disclosure button reads {:?}, assuming all items shown", label.trim());
            return Ok(report(rounds, clicks, StopReason::EndOfList));
        }
        if overlap_reached(page, list, known, tuning).await? {
            info!("Known conversations reached after {} show-more clicks", clicks);
            return Ok(report(rounds, clicks, StopReason::KnownOverlap));
        }
        if clicks >= tuning.max_button_clicks {
            info!("Show-more click limit ({}) reached", tuning.max_button_clicks);
            return Ok(report(rounds, clicks, StopReason::ClickLimit));
        }

        page.click(btn).await?;
        clicks += 1;
        tokio::time::sleep(tuning.show_more_wait()).await;
    }
}

async fn actionable_show_more<P: Page + ?Sized>(
    page: &P,
    list: NodeHandle,
) -> Result<Option<NodeHandle>> {
    let Some(btn) = page.query(Some(list), sel::SHOW_MORE_BUTTON).await? else {
        return Ok(None);
    };
    if sel::is_show_more_label(&page.text(btn).await?) {
        Ok(Some(btn))
    } else {
        Ok(None)
    }
}

/// Count rendered items whose URL is already stored, stopping at the threshold.
async fn overlap_reached<P: Page + ?Sized>(
    page: &P,
    list: NodeHandle,
    known: &HashSet<String>,
    tuning: &Tuning,
) -> Result<bool> {
    let threshold = tuning.known_overlap_threshold;
    if threshold == 0 || known.is_empty() {
        return Ok(false);
    }

    let mut seen = 0usize;
    for node in page.query_all(Some(list), sel::CONVERSATION_ITEM).await? {
        let Some(token) = page.attribute(node, sel::METADATA_ATTR).await? else {
            continue;
        };
        let Some(id) = identity::chat_id(&token) else {
            continue;
        };
        if known.contains(&identity::canonical_url(id)) {
            seen += 1;
            if seen >= threshold {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
