use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const APP_BASE_URL: &str = "https://gemini.google.com/app/";

// Marker, seven placeholder fields, then the nested list whose first quoted
// element is the chat id (optionally tagged `c_`).
static JSLOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"BardVeMetadataKey:\[(?:[^,\]]*?,){7}\s*\["(?:c_)?([a-zA-Z0-9]+)""#).unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub title: String,
    pub url: String,
}

/// Pull the chat id out of a `jslog` metadata token.
pub fn chat_id(token: &str) -> Option<&str> {
    JSLOG_RE
        .captures(token)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

pub fn canonical_url(id: &str) -> String {
    format!("{}{}", APP_BASE_URL, id)
}

/// Build a record from an item's token and raw title text, or `None` when the
/// token does not carry a recognisable id.
pub fn extract(token: &str, title: &str) -> Option<ConversationRecord> {
    let id = chat_id(token)?;
    let title = title.trim();
    Some(ConversationRecord {
        title: if title.is_empty() {
            "Untitled".to_string()
        } else {
            title.to_string()
        },
        url: canonical_url(id),
    })
}
