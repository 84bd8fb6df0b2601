use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Normalized sender identity derived from a raw `From` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: String,
    pub display_name: String,
}

/// Parse a raw header into an identity. Never fails: input without a
/// recognizable address degrades to the trimmed, lowercased raw string.
/// Blank input and `< >` yield an empty address and name; callers that
/// count senders drop those.
pub fn extract(raw: &str) -> Identity {
    let address = extract_address(raw);
    let display_name = extract_display_name(raw).unwrap_or_else(|| address.clone());
    Identity {
        address,
        display_name,
    }
}

pub fn extract_address(raw: &str) -> String {
    if let Some(captures) = angle_pattern().captures(raw) {
        if let Some(inner) = captures.get(1) {
            return inner.as_str().trim().to_lowercase();
        }
    }

    if let Some(found) = email_pattern().find(raw) {
        return found.as_str().trim().to_lowercase();
    }

    raw.trim().to_lowercase()
}

/// Name segment before the first `<`, with whitespace and one layer of
/// quotes removed. `None` when there is no such segment or it is empty.
pub fn extract_display_name(raw: &str) -> Option<String> {
    let (before, _) = raw.split_once('<')?;
    let name = strip_quote(strip_quote(before.trim(), '"'), '\'').trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn strip_quote(value: &str, quote: char) -> &str {
    let value = value.strip_prefix(quote).unwrap_or(value);
    value.strip_suffix(quote).unwrap_or(value)
}

fn angle_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<([^>]+)>").expect("compile angle address regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[\w.-]+@[\w.-]+\.\w+").expect("compile bare email regex")
    })
}
