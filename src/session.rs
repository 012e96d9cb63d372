//! Session (room) naming rules.

use crate::constants::{NAME_CHAT_WITH_PREFIX, NAME_JOINING, NAME_NEW_CHAT, NAME_UNKNOWN};
use uuid::Uuid;

/// Provisional names that must never replace a learned name.
pub fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    name == NAME_JOINING
        || name == NAME_UNKNOWN
        || name == NAME_NEW_CHAT
        || name.starts_with(NAME_CHAT_WITH_PREFIX)
}

/// A name that may overwrite an existing one: non-empty and not a placeholder.
pub fn is_real_name(name: &str) -> bool {
    !name.trim().is_empty() && !is_placeholder_name(name)
}

pub fn chat_with(sender_name: &str) -> String {
    format!("{} {}", NAME_CHAT_WITH_PREFIX, sender_name)
}

/// Name to store after seeing `incoming` for a session currently named `existing`.
///
/// A brand-new session takes whatever was proposed (placeholders included), falling back
/// to "Unknown". An existing session only changes to a real name.
pub fn merge_name(existing: Option<&str>, incoming: Option<&str>) -> String {
    match (existing, incoming) {
        (None, Some(name)) if !name.trim().is_empty() => name.to_string(),
        (None, _) => NAME_UNKNOWN.to_string(),
        (Some(_), Some(name)) if is_real_name(name) => name.to_string(),
        (Some(current), _) => current.to_string(),
    }
}

/// Short upper-case id for locally created rooms; easy to read out to a friend.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_uppercase()
}
