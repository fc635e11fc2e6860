//! Selectors for the Gemini sidebar. These track the live app markup and are
//! the first thing to revisit when extraction starts coming back empty.

pub const SIDENAV: &str = r#"bard-sidenav[role="navigation"]"#;
pub const SIDENAV_OPEN_WIDTH: &str = "var(--bard-sidenav-open-width)";

/// Any one of these inside the sidenav means it actually rendered its content.
pub const SIDENAV_LANDMARKS: &[&str] = &[
    CONVERSATION_LIST,
    r#"side-nav-action-button[data-test-id="new-chat-button"]"#,
    r#"button[aria-label="New chat"]"#,
];

pub const CONVERSATION_LIST: &str = r#"conversations-list[data-test-id="all-conversations"]"#;
pub const ITEM_CONTAINER: &str = "div.conversation-items-container";
pub const CONVERSATION_ITEM: &str = r#"div[role="button"][data-test-id="conversation"][jslog]"#;
pub const CONVERSATION_TITLE: &str = "div.conversation-title";
pub const METADATA_ATTR: &str = "jslog";

pub const SHOW_MORE_BUTTON: &str = r#"button[data-test-id="show-more-button"]"#;
pub const SHOW_MORE_LABEL: &str = "show more";

/// How to find an element when the markup offers several hooks of varying reliability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Css(&'static str),
    /// Elements matching `selector` whose trimmed text equals `text`.
    Text {
        selector: &'static str,
        text: &'static str,
    },
}

/// Menu toggle lookups, most specific first.
pub const MENU_BUTTON: &[Strategy] = &[
    Strategy::Css(r#"button[data-test-id="side-nav-menu-button"]"#),
    Strategy::Css(r#"button[aria-label="Main menu"]"#),
    Strategy::Text {
        selector: "button",
        text: "Main menu",
    },
    Strategy::Css(r#"button[aria-label*="menu" i][aria-expanded]"#),
];

pub fn is_show_more_label(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(SHOW_MORE_LABEL)
}
