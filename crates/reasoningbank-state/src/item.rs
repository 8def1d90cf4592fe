//! Procedural memory items.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 of `title + content`.
pub const ITEM_ID_HEX_LEN: usize = 16;

/// Maximum number of words in an item title.
pub const MAX_TITLE_WORDS: usize = 10;

/// Valence of the trajectory an item was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Success,
    Failure,
    Seed,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Seed => "seed",
        }
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "seed" => Ok(Self::Seed),
            other => Err(format!("unknown polarity: {other}")),
        }
    }
}

/// Deterministic item id: truncated SHA-256 hex of `title + content`.
pub fn item_id(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(content.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ITEM_ID_HEX_LEN);
    id
}

/// Clamp a title to [`MAX_TITLE_WORDS`] words, normalising whitespace.
pub fn clamp_title(title: &str) -> String {
    title
        .split_whitespace()
        .take(MAX_TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A reusable procedure learned from (or seeded for) past tasks.
///
/// Immutable once created. The snapshot field names (`desc`, `src`) match the
/// on-disk memory format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Derived from title and content; seed files may omit it.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    pub content: String,
    #[serde(rename = "src")]
    pub source_polarity: Polarity,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Item {
    /// Build an item; the title is clamped to ten words and the id derived
    /// from the clamped title and the content.
    pub fn new(
        title: impl AsRef<str>,
        description: impl Into<String>,
        content: impl Into<String>,
        source_polarity: Polarity,
    ) -> Self {
        let title = clamp_title(title.as_ref());
        let content = content.into();
        Self {
            id: item_id(&title, &content),
            title,
            description: description.into(),
            content,
            source_polarity,
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Text searched by keyword retrieval: title, description and tags.
    pub fn search_text(&self) -> String {
        let mut text = format!("{} {}", self.title, self.description);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text
    }
}
