//! Normalized identifiers for rooms and users.
//!
//! The server is loose about casing and decoration: room names arrive with
//! arbitrary case and punctuation, user strings carry a rank sigil and
//! sometimes a trailing away marker (`@UserName@!`). All lookups go through
//! the normalized forms below, which are deterministic and idempotent.

use std::fmt;

use crate::rank::Rank;

/// A normalized room identifier: lowercase alphanumerics plus hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    /// Normalize raw text into a room id.
    pub fn new(raw: &str) -> Self {
        let id = raw
            .chars()
            .filter_map(|c| match c {
                'A'..='Z' => Some(c.to_ascii_lowercase()),
                'a'..='z' | '0'..='9' | '-' => Some(c),
                _ => None,
            })
            .collect();
        RoomId(id)
    }

    /// The room that frames without a room marker belong to.
    pub fn global() -> Self {
        RoomId("global".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized user identifier: the rank sigil and any trailing status
/// markers stripped, then lowercase alphanumerics only.
///
/// Identity comparisons are always on this form; the raw display string is
/// carried separately by whoever needs it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

impl UserId {
    /// Normalize a raw user string into a user id.
    pub fn new(raw: &str) -> Self {
        let trimmed = raw.trim();
        let (_, bare) = Rank::split(trimmed);
        // Roster entries append status markers after a second `@`
        // (user names themselves cannot contain one).
        let bare = bare.split('@').next().unwrap_or(bare);
        let id = bare
            .chars()
            .filter_map(|c| match c {
                'A'..='Z' => Some(c.to_ascii_lowercase()),
                'a'..='z' | '0'..='9' => Some(c),
                _ => None,
            })
            .collect();
        UserId(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
