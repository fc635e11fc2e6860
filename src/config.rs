use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Timing and threshold knobs for one harvest run. Every field can be
/// overridden from a TOML file; unset fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // Locator
    pub menu_recheck_ms: u64,
    pub sidebar_poll_attempts: u32,
    pub sidebar_poll_ms: u64,
    pub list_lookup_attempts: u32,
    pub list_lookup_ms: u64,
    pub max_ancestor_depth: u32,

    // Pagination, scroll mode
    pub max_scroll_rounds: u32,
    pub scroll_settle_ms: u64,
    pub show_more_attempts: u32,
    pub stall_threshold: u32,

    // Pagination, button-only mode
    pub show_more_wait_ms: u64,
    pub button_missing_attempts: u32,
    pub button_retry_ms: u64,
    pub max_button_clicks: u32,

    // Early exit
    pub stored_skip_threshold: usize,
    pub known_overlap_threshold: usize,

    // Extraction
    pub render_wait_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            menu_recheck_ms: 100,
            sidebar_poll_attempts: 20,
            sidebar_poll_ms: 300,
            list_lookup_attempts: 5,
            list_lookup_ms: 500,
            max_ancestor_depth: 8,

            max_scroll_rounds: 40,
            scroll_settle_ms: 1500,
            show_more_attempts: 3,
            stall_threshold: 3,

            show_more_wait_ms: 1500,
            button_missing_attempts: 3,
            button_retry_ms: 500,
            max_button_clicks: 200,

            stored_skip_threshold: 1000,
            known_overlap_threshold: 3,

            render_wait_ms: 1000,
        }
    }
}

impl Tuning {
    /// Same thresholds, no waiting. A saved snapshot never changes under us.
    pub fn immediate(self) -> Self {
        Self {
            menu_recheck_ms: 0,
            sidebar_poll_ms: 0,
            list_lookup_ms: 0,
            scroll_settle_ms: 0,
            show_more_wait_ms: 0,
            button_retry_ms: 0,
            render_wait_ms: 0,
            ..self
        }
    }

    pub fn menu_recheck(&self) -> Duration {
        Duration::from_millis(self.menu_recheck_ms)
    }

    pub fn sidebar_poll(&self) -> Duration {
        Duration::from_millis(self.sidebar_poll_ms)
    }

    pub fn list_lookup(&self) -> Duration {
        Duration::from_millis(self.list_lookup_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn show_more_wait(&self) -> Duration {
        Duration::from_millis(self.show_more_wait_ms)
    }

    pub fn button_retry(&self) -> Duration {
        Duration::from_millis(self.button_retry_ms)
    }

    pub fn render_wait(&self) -> Duration {
        Duration::from_millis(self.render_wait_ms)
    }
}

/// Load tuning from `path`, or the defaults when no file is given.
pub fn load(path: Option<&Path>) -> Result<Tuning> {
    let Some(path) = path else {
        return Ok(Tuning::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    parse(&raw).with_context(|| format!("Invalid config {}", path.display()))
}

fn parse(raw: &str) -> Result<Tuning> {
    Ok(toml::from_str(raw)?)
}
