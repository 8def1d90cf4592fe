//! Append-only procedural memory store with two-phase retrieval.
//!
//! Phase 1, [`MemStore::search`], ranks items by keyword overlap and returns
//! metadata previews only. Phase 2, [`MemStore::get`], fetches full items for
//! an explicit, capped list of ids. [`MemStore::quote`] returns a bounded
//! excerpt of a single item.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::item::{item_id, Item, Polarity};
use crate::similarity::{jaccard, sequence_ratio, word_set};
use crate::StoreResult;

/// Default number of search hits.
pub const DEFAULT_SEARCH_K: usize = 6;

/// Default hard cap on ids accepted by [`MemStore::get`].
pub const DEFAULT_GET_MAX: usize = 3;

/// Default excerpt length for [`MemStore::quote`].
pub const DEFAULT_QUOTE_CHARS: usize = 500;

const ELLIPSIS: &str = "...";

/// Thresholds for near-duplicate detection during consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DedupThresholds {
    /// Minimum title sequence ratio.
    pub title: f64,
    /// Minimum content word-set Jaccard index.
    pub content: f64,
}

impl Default for DedupThresholds {
    fn default() -> Self {
        Self {
            title: 0.85,
            content: 0.85,
        }
    }
}

impl DedupThresholds {
    /// Whether `candidate` duplicates `existing`.
    pub fn is_duplicate(&self, existing: &Item, candidate: &Item) -> bool {
        sequence_ratio(&existing.title, &candidate.title) >= self.title
            && jaccard(&existing.content, &candidate.content) >= self.content
    }
}

/// Search hit: item metadata without its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPreview {
    pub id: String,
    pub title: String,
    #[serde(rename = "desc")]
    pub description: String,
    #[serde(rename = "src")]
    pub source_polarity: Polarity,
}

impl From<&Item> for ItemPreview {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            source_polarity: item.source_polarity,
        }
    }
}

/// Outcome of a consolidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    /// Ids of items actually appended, in input order.
    pub added: Vec<String>,
    /// Titles of items skipped as near-duplicates.
    pub rejected: Vec<String>,
}

/// Append-only collection of memory items.
///
/// Items are kept in insertion order. `add` never deduplicates, so the same
/// id may appear more than once; lookups by id return the first occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemStore {
    items: Vec<Item>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in insertion order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    /// Unconditional append; returns the item's id.
    pub fn add(&mut self, item: Item) -> String {
        let id = item.id.clone();
        debug!(id = %id, polarity = %item.source_polarity, "memory item added");
        self.items.push(item);
        id
    }

    /// Append `items`, skipping near-duplicates when `dedup` is set, using
    /// the default thresholds. Returns the ids actually added.
    pub fn consolidate(&mut self, items: Vec<Item>, dedup: bool) -> Vec<String> {
        let thresholds = dedup.then(DedupThresholds::default);
        self.consolidate_with(items, thresholds).added
    }

    /// Append `items`, checking each against every stored item (including
    /// ones appended earlier in the same batch) when `thresholds` is set.
    pub fn consolidate_with(
        &mut self,
        items: Vec<Item>,
        thresholds: Option<DedupThresholds>,
    ) -> ConsolidationReport {
        let mut report = ConsolidationReport::default();
        for item in items {
            if let Some(t) = thresholds {
                if self.items.iter().any(|existing| t.is_duplicate(existing, &item)) {
                    info!(
                        event = "memory.duplicate_rejected",
                        id = %item.id,
                        title = %item.title,
                    );
                    report.rejected.push(item.title);
                    continue;
                }
            }
            report.added.push(self.add(item));
        }
        report
    }

    /// Keyword search over title, description and tags.
    ///
    /// Score is the size of the intersection between the query word set and
    /// the item word set. Results are ordered by score, ties by insertion
    /// order; zero-score items rank last but are still eligible so a store
    /// always yields up to `k` candidates of the requested polarity.
    pub fn search(&self, query: &str, k: usize, polarity: Option<Polarity>) -> Vec<ItemPreview> {
        let query_words = word_set(query);
        let mut scored: Vec<(usize, &Item)> = self
            .items
            .iter()
            .filter(|item| polarity.map_or(true, |p| item.source_polarity == p))
            .map(|item| {
                let words = word_set(&item.search_text());
                (query_words.intersection(&words).count(), item)
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(k)
            .map(|(_, item)| ItemPreview::from(item))
            .collect()
    }

    /// Full items for `ids`. Rejects the whole request when it names more
    /// than `max_n` ids; never returns a partial result.
    pub fn get(&self, ids: &[String], max_n: usize) -> StoreResult<Vec<Item>> {
        if ids.len() > max_n {
            return Err(StoreError::TooManyRequested {
                requested: ids.len(),
                max: max_n,
            });
        }
        ids.iter()
            .map(|id| {
                self.find(id)
                    .cloned()
                    .ok_or_else(|| StoreError::ItemNotFound { id: id.clone() })
            })
            .collect()
    }

    /// Bounded excerpt of one item's content. When cut, the first `max_chars`
    /// characters are followed by `"..."`.
    pub fn quote(&self, id: &str, max_chars: usize) -> StoreResult<String> {
        let item = self
            .find(id)
            .ok_or_else(|| StoreError::ItemNotFound { id: id.to_string() })?;
        if item.content.chars().count() <= max_chars {
            return Ok(item.content.clone());
        }
        let mut excerpt: String = item.content.chars().take(max_chars).collect();
        excerpt.push_str(ELLIPSIS);
        Ok(excerpt)
    }

    /// Write the whole store as a JSON array of items.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_vec_pretty(&self.items)?;
        std::fs::write(path, json)?;
        info!(event = "memory.saved", path = %path.display(), items = self.items.len());
        Ok(())
    }

    /// Read a store previously written by [`MemStore::save`].
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let items = read_items(path)?;
        info!(event = "memory.loaded", path = %path.display(), items = items.len());
        Ok(Self { items })
    }

    /// Bootstrap from a seed file (same schema as a snapshot), consolidating
    /// against what is already stored. Returns the ids added.
    pub fn extend_from_path(
        &mut self,
        path: impl AsRef<Path>,
        dedup: bool,
    ) -> StoreResult<Vec<String>> {
        let items = read_items(path.as_ref())?;
        Ok(self.consolidate(items, dedup))
    }

    fn find(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// Ids on disk are never trusted: each one is re-derived from title and
/// content.
fn read_items(path: &Path) -> StoreResult<Vec<Item>> {
    let bytes = std::fs::read(path)?;
    let mut items: Vec<Item> = serde_json::from_slice(&bytes)?;
    for item in &mut items {
        let id = item_id(&item.title, &item.content);
        if item.id != id {
            if !item.id.is_empty() {
                warn!(
                    event = "memory.id_rederived",
                    path = %path.display(),
                    stored = %item.id,
                    derived = %id,
                );
            }
            item.id = id;
        }
    }
    Ok(items)
}
