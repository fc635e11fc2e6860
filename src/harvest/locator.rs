use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Tuning;
use crate::page::{NodeHandle, Page};
use crate::selectors::{self as sel, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { list: NodeHandle },
    NotReady,
}

/// Make sure the sidebar is open and the conversation list is mounted.
pub async fn ensure_ready<P: Page + ?Sized>(page: &P, tuning: &Tuning) -> Result<Readiness> {
    if !ensure_sidebar_open(page, tuning).await? {
        warn!("Sidebar could not be opened or confirmed");
        return Ok(Readiness::NotReady);
    }

    match find_list(page, tuning).await? {
        Some(list) => Ok(Readiness::Ready { list }),
        None => {
            warn!(
                "Conversation list not found after {} attempts",
                tuning.list_lookup_attempts
            );
            Ok(Readiness::NotReady)
        }
    }
}

/// The sidenav counts as open only when it is styled open, visible, and has
/// rendered at least one of its known children.
async fn valid_sidenav<P: Page + ?Sized>(page: &P) -> Result<Option<NodeHandle>> {
    let Some(nav) = page.query(None, sel::SIDENAV).await? else {
        return Ok(None);
    };

    let open_styled = page
        .attribute(nav, "style")
        .await?
        .is_some_and(|s| s.contains(sel::SIDENAV_OPEN_WIDTH));
    if !open_styled || !page.is_visible(nav).await? {
        return Ok(None);
    }

    for landmark in sel::SIDENAV_LANDMARKS {
        if page.query(Some(nav), landmark).await?.is_some() {
            return Ok(Some(nav));
        }
    }
    Ok(None)
}

async fn ensure_sidebar_open<P: Page + ?Sized>(page: &P, tuning: &Tuning) -> Result<bool> {
    if valid_sidenav(page).await?.is_some() {
        debug!("Sidebar already open");
        return Ok(true);
    }

    match find_first(page, sel::MENU_BUTTON).await? {
        Some(menu) => {
            let expanded = page.attribute(menu, "aria-expanded").await?;
            if expanded.as_deref() == Some("true") {
                // Already toggled; give it a moment rather than closing it again.
                tokio::time::sleep(tuning.menu_recheck()).await;
                if valid_sidenav(page).await?.is_some() {
                    info!("Sidebar valid after expanded-state recheck");
                    return Ok(true);
                }
            } else {
                info!("Opening sidebar via menu button");
                page.click(menu).await?;
                for attempt in 1..=tuning.sidebar_poll_attempts {
                    tokio::time::sleep(tuning.sidebar_poll()).await;
                    if valid_sidenav(page).await?.is_some() {
                        info!("Sidebar open after {} polls", attempt);
                        return Ok(true);
                    }
                }
            }
        }
        None => info!("Menu button not found with any strategy"),
    }

    Ok(valid_sidenav(page).await?.is_some())
}

async fn find_list<P: Page + ?Sized>(page: &P, tuning: &Tuning) -> Result<Option<NodeHandle>> {
    for attempt in 0..tuning.list_lookup_attempts {
        if let Some(list) = page.query(None, sel::CONVERSATION_LIST).await? {
            debug!("Found conversation list after {} retries", attempt);
            return Ok(Some(list));
        }
        debug!(
            "Conversation list not found (attempt {}/{})",
            attempt + 1,
            tuning.list_lookup_attempts
        );
        tokio::time::sleep(tuning.list_lookup()).await;
    }
    Ok(None)
}

/// First element found by the earliest strategy that finds anything.
pub async fn find_first<P: Page + ?Sized>(
    page: &P,
    strategies: &[Strategy],
) -> Result<Option<NodeHandle>> {
    for strategy in strategies {
        match *strategy {
            Strategy::Css(css) => {
                if let Some(node) = page.query(None, css).await? {
                    return Ok(Some(node));
                }
            }
            Strategy::Text { selector, text } => {
                for node in page.query_all(None, selector).await? {
                    if page.text(node).await?.trim() == text {
                        return Ok(Some(node));
                    }
                }
            }
        }
    }
    Ok(None)
}
