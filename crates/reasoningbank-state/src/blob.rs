//! Handle-based blob store.
//!
//! Content goes in through [`BlobStore::put`] and only a [`Ref`] comes back:
//! a key, a dtype, a size and an 80-character preview. Full payloads are
//! reachable only through the store, either whole (`get`) or through the
//! explicitly bounded accessors (`peek`, `slice`, `stats`).
//!
//! Sizes and offsets are measured in characters, not bytes, so previews and
//! slices never split a code point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::StoreResult;

/// Maximum preview length carried by a [`Ref`].
pub const PREVIEW_CHARS: usize = 80;

/// Default `peek` length.
pub const DEFAULT_PEEK_CHARS: usize = 200;

/// Kind of payload behind a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    Graph,
    Results,
    Mem,
    Text,
    ServiceDesc,
}

impl Dtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Results => "results",
            Self::Mem => "mem",
            Self::Text => "text",
            Self::ServiceDesc => "service_desc",
        }
    }
}

impl std::fmt::Display for Dtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lightweight handle standing in for a stored payload.
///
/// Never carries the payload itself; safe to place in a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub key: String,
    pub dtype: Dtype,
    /// Payload length in characters.
    pub size: usize,
    /// First [`PREVIEW_CHARS`] characters of the payload.
    pub preview: String,
}

impl std::fmt::Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ref(key={}, dtype={}, size={}, preview={:?})",
            self.key, self.dtype, self.size, self.preview
        )
    }
}

/// Payload statistics that expose no content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStats {
    pub size: usize,
    pub line_count: usize,
}

/// In-memory key → content map handing out [`Ref`]s.
///
/// Keys are `"{dtype}_{n}"` with `n` drawn from one counter shared by every
/// dtype, so keys are unique and monotonically increasing per store.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: RwLock<HashMap<String, String>>,
    next_id: AtomicU64,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `content` and return a handle for it.
    pub fn put(&self, content: impl Into<String>, dtype: Dtype) -> Ref {
        let content = content.into();
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = format!("{}_{}", dtype.as_str(), n);
        let handle = Ref {
            key: key.clone(),
            dtype,
            size: content.chars().count(),
            preview: content.chars().take(PREVIEW_CHARS).collect(),
        };
        tracing::debug!(key = %key, dtype = %dtype, size = handle.size, "blob stored");
        self.blobs.write().insert(key, content);
        handle
    }

    /// Full payload for `key`.
    pub fn get(&self, key: &str) -> StoreResult<String> {
        self.with_blob(key, |content| content.to_string())
    }

    /// First `n` characters of the payload.
    pub fn peek(&self, key: &str, n: usize) -> StoreResult<String> {
        self.with_blob(key, |content| content.chars().take(n).collect())
    }

    /// Characters `start..end` of the payload; `end` is clamped to the
    /// payload length and an inverted range yields an empty string.
    pub fn slice(&self, key: &str, start: usize, end: usize) -> StoreResult<String> {
        self.with_blob(key, |content| {
            let len = content.chars().count();
            let end = end.min(len);
            if start >= end {
                return String::new();
            }
            content.chars().skip(start).take(end - start).collect()
        })
    }

    /// Size and line count of the payload.
    pub fn stats(&self, key: &str) -> StoreResult<BlobStats> {
        self.with_blob(key, |content| BlobStats {
            size: content.chars().count(),
            line_count: content.lines().count(),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    fn with_blob<T>(&self, key: &str, f: impl FnOnce(&str) -> T) -> StoreResult<T> {
        let guard = self.blobs.read();
        guard
            .get(key)
            .map(|content| f(content))
            .ok_or_else(|| StoreError::HandleNotFound {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_returns_bounded_handle() {
        let store = BlobStore::new();
        let content = "x".repeat(5000);
        let r = store.put(content.clone(), Dtype::Results);

        assert_eq!(r.dtype, Dtype::Results);
        assert_eq!(r.size, 5000);
        assert_eq!(r.preview, "x".repeat(80));
        assert_eq!(store.get(&r.key).unwrap(), content);
    }

    #[test]
    fn test_keys_are_monotonic_across_dtypes() {
        let store = BlobStore::new();
        let a = store.put("a", Dtype::Text);
        let b = store.put("b", Dtype::Results);
        let c = store.put("c", Dtype::Text);
        assert_eq!(a.key, "text_0");
        assert_eq!(b.key, "results_1");
        assert_eq!(c.key, "text_2");
    }

    #[test]
    fn test_short_content_preview_is_whole_content() {
        let store = BlobStore::new();
        let r = store.put("short", Dtype::Text);
        assert_eq!(r.preview, "short");
        assert_eq!(r.size, 5);
    }

    #[test]
    fn test_peek_and_slice() {
        let store = BlobStore::new();
        let r = store.put("0123456789", Dtype::Text);

        assert_eq!(store.peek(&r.key, 3).unwrap(), "012");
        assert_eq!(store.peek(&r.key, 100).unwrap(), "0123456789");
        assert_eq!(store.slice(&r.key, 2, 5).unwrap(), "234");
        assert_eq!(store.slice(&r.key, 8, 500).unwrap(), "89");
        assert_eq!(store.slice(&r.key, 6, 2).unwrap(), "");
    }

    #[test]
    fn test_multibyte_content_counts_chars() {
        let store = BlobStore::new();
        let r = store.put("héllo wörld", Dtype::Text);
        assert_eq!(r.size, 11);
        assert_eq!(store.slice(&r.key, 1, 4).unwrap(), "éll");
    }

    #[test]
    fn test_stats_counts_lines() {
        let store = BlobStore::new();
        let r = store.put("a\nb\nc", Dtype::Results);
        let stats = store.stats(&r.key).unwrap();
        assert_eq!(stats.size, 5);
        assert_eq!(stats.line_count, 3);
    }

    #[test]
    fn test_missing_key_is_handle_not_found() {
        let store = BlobStore::new();
        assert!(matches!(
            store.get("results_99"),
            Err(StoreError::HandleNotFound { .. })
        ));
        assert!(store.peek("nope", 10).is_err());
        assert!(store.slice("nope", 0, 1).is_err());
        assert!(store.stats("nope").is_err());
        assert!(!store.contains("nope"));
    }
}
