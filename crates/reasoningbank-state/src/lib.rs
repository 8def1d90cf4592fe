//! ReasoningBank State: handles, blobs and procedural memory
//!
//! This crate holds the two stores shared by every other layer of the
//! workbench. Neither store ever pushes a full payload at its caller
//! unasked: blobs come back as [`Ref`] handles and memory search returns
//! previews, with full content behind explicit, capped accessors.
//!
//! ## Layer 0 - Data
//!
//! Focus: handle opacity, bounded retrieval, append-only memory.
//!
//! ## Key Components
//!
//! - `BlobStore`: key → content map returning `Ref` handles
//! - `MemStore`: append-only `Item` collection with polarity-aware search,
//!   capped `get`, bounded `quote`, and whole-snapshot JSON persistence
//! - `similarity`: word-set Jaccard and sequence ratio for dedup

mod blob;
mod error;
mod item;
mod memstore;
pub mod similarity;

pub use blob::{BlobStats, BlobStore, Dtype, Ref, DEFAULT_PEEK_CHARS, PREVIEW_CHARS};
pub use error::StoreError;
pub use item::{clamp_title, item_id, Item, Polarity, ITEM_ID_HEX_LEN, MAX_TITLE_WORDS};
pub use memstore::{
    ConsolidationReport, DedupThresholds, ItemPreview, MemStore, DEFAULT_GET_MAX,
    DEFAULT_QUOTE_CHARS, DEFAULT_SEARCH_K,
};

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
