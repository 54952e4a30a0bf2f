//! Player name canonicalisation.
//!
//! Raw names arrive from several protocols decorated with colour codes and
//! clan tags. The canonical form keeps only `[A-Za-z0-9_-]` and is the join
//! key between polled players and the ledger's registered names.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

static COLOR_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\^\d").expect("valid regex"));

// Shortest match per bracket kind, applied in this order.
static BRACKET_GROUPS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"\[.*?\]").expect("valid regex"),
        Regex::new(r"\{.*?\}").expect("valid regex"),
        Regex::new(r"\(.*?\)").expect("valid regex"),
        Regex::new(r"<.*?>").expect("valid regex"),
    ]
});

static LONE_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[\]\{\}\(\)<>]").expect("valid regex"));

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Reduces a raw player name to its canonical form.
///
/// Returns an empty string when nothing survives; callers must drop those
/// before using the result as a key. Never panics and is idempotent.
pub fn sanitize(raw: &str) -> String {
    let mut name = COLOR_CODE.replace_all(raw, "").into_owned();
    for group in BRACKET_GROUPS.iter() {
        name = group.replace_all(&name, "").into_owned();
    }
    name = LONE_BRACKETS.replace_all(&name, "").into_owned();
    name.retain(is_name_char);
    name.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidName {
    #[error("player name is empty")]
    Empty,
    #[error("player name {0:?} contains characters outside [A-Za-z0-9_-]")]
    NotCanonical(String),
}

/// A non-empty, canonical player identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlayerName(String);

impl PlayerName {
    /// Accepts a string that is already canonical.
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidName> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidName::Empty);
        }
        if !name.chars().all(is_name_char) {
            return Err(InvalidName::NotCanonical(name));
        }
        Ok(Self(name))
    }

    /// Sanitizes a raw protocol name, `None` when nothing survives.
    pub fn sanitized(raw: &str) -> Option<Self> {
        let name = sanitize(raw);
        if name.is_empty() {
            None
        } else {
            Some(Self(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PlayerName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PlayerName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlayerName {
    type Error = InvalidName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlayerName> for String {
    fn from(name: PlayerName) -> Self {
        name.0
    }
}
