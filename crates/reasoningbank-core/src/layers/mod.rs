//! Layer packers.
//!
//! Each layer turns some source state into a text block no longer than its
//! character budget. Packers never fail: an empty source or a zero budget
//! yields an empty string, and oversized output is cut, lowest-priority
//! content first.
//!
//! | Layer | Module | Source |
//! |-------|--------|--------|
//! | L0 | [`sense`] | ontology metadata card |
//! | L1 | [`schema`] | domain/range, disjointness, characteristics, cardinality |
//! | L2 | [`memory`] | retrieved procedural memory items |
//! | L3 | [`guide`] | long reference guide, extractively compressed |

pub mod guide;
pub mod memory;
pub mod schema;
pub mod sense;

use serde::{Deserialize, Serialize};

/// The four context layers, in assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Sense,
    Schema,
    Memory,
    Guide,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::Sense, Layer::Schema, Layer::Memory, Layer::Guide];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Sense => "L0 sense",
            Self::Schema => "L1 schema",
            Self::Memory => "L2 memory",
            Self::Guide => "L3 guide",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// First `budget` characters of `text`.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    text.chars().take(budget).collect()
}

/// Accumulates lines in priority order until the next line would overflow
/// the budget; everything after that point is dropped. A first line that is
/// already too long is cut rather than dropped.
#[derive(Debug)]
pub(crate) struct LineBudget {
    budget: usize,
    used: usize,
    out: String,
    full: bool,
}

impl LineBudget {
    pub(crate) fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            out: String::new(),
            full: budget == 0,
        }
    }

    /// Append `line`; returns `false` once the budget is exhausted.
    pub(crate) fn push(&mut self, line: &str) -> bool {
        if self.full {
            return false;
        }
        let sep = usize::from(!self.out.is_empty());
        let cost = sep + line.chars().count();
        if self.used + cost > self.budget {
            if self.out.is_empty() {
                self.out = truncate_chars(line, self.budget);
                self.used = self.out.chars().count();
            }
            self.full = true;
            return false;
        }
        if sep == 1 {
            self.out.push('\n');
        }
        self.out.push_str(line);
        self.used += cost;
        true
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}
