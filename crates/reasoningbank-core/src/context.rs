//! Layer-cake context assembly.
//!
//! Layers are packed in fixed order L0 → L1 → L2 → L3. Each enabled layer
//! gets its configured character budget; the blank-line separator in front
//! of a block is charged to that block's budget, so the rendered context is
//! never longer than the sum of the enabled budgets.

use serde::{Deserialize, Serialize};
use tracing::debug;

use reasoningbank_state::{Item, MemStore, Polarity, StoreResult};

use crate::config::{BankConfig, InjectionMode, LayerCakeConfig, RetrievalPolicy};
use crate::error::Result;
use crate::graph::GraphAdapter;
use crate::layers::{guide, memory, schema, sense, Layer};
use crate::obs;
use crate::tools::ToolRegistry;

const SEPARATOR: &str = "\n\n";

/// What one layer contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerReport {
    pub layer: Layer,
    pub enabled: bool,
    /// Configured budget.
    pub budget: usize,
    /// Characters of block text, excluding the separator.
    pub chars: usize,
}

/// Packed layers plus the bookkeeping needed to audit a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembledContext {
    pub blocks: Vec<(Layer, String)>,
    pub reports: Vec<LayerReport>,
    /// Ids of memory items injected into L2, in section order.
    pub memory_ids: Vec<String>,
}

impl AssembledContext {
    /// Non-empty blocks joined by blank lines.
    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }

    pub fn block(&self, layer: Layer) -> Option<&str> {
        self.blocks
            .iter()
            .find(|(l, _)| *l == layer)
            .map(|(_, text)| text.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Builds prompts from a loaded graph, an optional memory store and an
/// optional reference guide.
pub struct ContextBuilder<'a> {
    graph: &'a GraphAdapter,
    layers: LayerCakeConfig,
    retrieval: RetrievalPolicy,
    guide: Option<String>,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(graph: &'a GraphAdapter, cfg: &BankConfig) -> Self {
        Self {
            graph,
            layers: cfg.layers,
            retrieval: cfg.retrieval,
            guide: None,
        }
    }

    /// Source text for the L3 layer.
    pub fn with_guide(mut self, text: impl Into<String>) -> Self {
        self.guide = Some(text.into());
        self
    }

    pub fn with_layers(mut self, layers: LayerCakeConfig) -> Self {
        self.layers = layers;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalPolicy) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn retrieval(&self) -> &RetrievalPolicy {
        &self.retrieval
    }

    /// Rendered context for `task` against the graph behind `graph_key`.
    pub fn build(&self, graph_key: &str, task: &str, mem: Option<&MemStore>) -> Result<String> {
        Ok(self.assemble(graph_key, task, mem)?.render())
    }

    pub fn assemble(
        &self,
        graph_key: &str,
        task: &str,
        mem: Option<&MemStore>,
    ) -> Result<AssembledContext> {
        let mut ctx = AssembledContext::default();

        for layer in Layer::ALL {
            let cfg = self.layers.get(layer);
            let mut report = LayerReport {
                layer,
                enabled: cfg.enabled,
                budget: cfg.char_budget,
                chars: 0,
            };
            if !cfg.enabled {
                ctx.reports.push(report);
                continue;
            }

            let sep_cost = if ctx.blocks.is_empty() {
                0
            } else {
                SEPARATOR.len()
            };
            let budget = cfg.char_budget.saturating_sub(sep_cost);

            let text = match layer {
                Layer::Sense => sense::pack(&self.graph.sense_card(graph_key)?, budget),
                Layer::Schema => {
                    schema::pack(&self.graph.schema_constraints(graph_key)?, budget)
                }
                Layer::Memory => match mem {
                    Some(mem) if self.retrieval.mode == InjectionMode::AutoInject => {
                        let items = self.retrieve(task, mem)?;
                        let text = memory::pack(&items, budget);
                        ctx.memory_ids.extend(
                            items
                                .into_iter()
                                .filter(|item| text.contains(&format!("- {}:", item.title)))
                                .map(|item| item.id),
                        );
                        text
                    }
                    _ => String::new(),
                },
                Layer::Guide => self
                    .guide
                    .as_deref()
                    .map(|g| guide::pack(g, budget))
                    .unwrap_or_default(),
            };

            report.chars = text.chars().count();
            obs::emit_layer_packed(layer, report.chars, cfg.char_budget);
            if !text.is_empty() {
                ctx.blocks.push((layer, text));
            }
            ctx.reports.push(report);
        }

        debug!(
            blocks = ctx.blocks.len(),
            memory_items = ctx.memory_ids.len(),
            "context assembled"
        );
        Ok(ctx)
    }

    /// Two-phase L2 retrieval: per polarity, `search` for previews and then
    /// `get` exactly those ids.
    pub fn retrieve(&self, task: &str, mem: &MemStore) -> StoreResult<Vec<Item>> {
        let quotas = [
            (Polarity::Success, self.retrieval.success_k),
            (Polarity::Failure, self.retrieval.failure_k),
            (Polarity::Seed, self.retrieval.seed_k),
        ];
        let mut items = Vec::new();
        for (polarity, k) in quotas {
            if k == 0 {
                continue;
            }
            let ids: Vec<String> = mem
                .search(task, k, Some(polarity))
                .into_iter()
                .map(|p| p.id)
                .collect();
            if !ids.is_empty() {
                items.extend(mem.get(&ids, k)?);
            }
        }
        Ok(items)
    }

    /// Tool set for the execution runner: graph and blob tools always,
    /// memory tools only under tool-mediated retrieval.
    pub fn tools(&self) -> ToolRegistry {
        ToolRegistry::bank(self.retrieval.mode == InjectionMode::ToolMediated)
    }
}
