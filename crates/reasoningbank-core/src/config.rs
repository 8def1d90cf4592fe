//! Workbench configuration.
//!
//! Everything has a default, so an empty TOML document is a complete
//! configuration. Environment overrides follow the `RBANK_*` chain and are
//! applied explicitly with [`BankConfig::apply_env_overrides`].
//!
//! ```toml
//! [layers.sense]
//! enabled = true
//! char_budget = 600
//!
//! [retrieval]
//! mode = "auto_inject"
//! success_k = 2
//!
//! [runner]
//! max_iterations = 12
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BankError, Result};
use crate::layers::Layer;

/// Budget configuration for one context layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub enabled: bool,
    pub char_budget: usize,
}

impl LayerConfig {
    pub fn enabled(char_budget: usize) -> Self {
        Self {
            enabled: true,
            char_budget,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            char_budget: 0,
        }
    }
}

/// Per-layer configuration for the layer cake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerCakeConfig {
    pub sense: LayerConfig,
    pub schema: LayerConfig,
    pub memory: LayerConfig,
    pub guide: LayerConfig,
}

impl Default for LayerCakeConfig {
    fn default() -> Self {
        Self {
            sense: LayerConfig::enabled(600),
            schema: LayerConfig::enabled(1000),
            memory: LayerConfig::enabled(2000),
            guide: LayerConfig::enabled(1500),
        }
    }
}

impl LayerCakeConfig {
    /// Every layer disabled; enable selectively with [`LayerCakeConfig::with`].
    pub fn none() -> Self {
        Self {
            sense: LayerConfig::disabled(),
            schema: LayerConfig::disabled(),
            memory: LayerConfig::disabled(),
            guide: LayerConfig::disabled(),
        }
    }

    pub fn with(mut self, layer: Layer, cfg: LayerConfig) -> Self {
        match layer {
            Layer::Sense => self.sense = cfg,
            Layer::Schema => self.schema = cfg,
            Layer::Memory => self.memory = cfg,
            Layer::Guide => self.guide = cfg,
        }
        self
    }

    pub fn get(&self, layer: Layer) -> LayerConfig {
        match layer {
            Layer::Sense => self.sense,
            Layer::Schema => self.schema,
            Layer::Memory => self.memory,
            Layer::Guide => self.guide,
        }
    }

    /// Sum of the budgets of enabled layers: the hard ceiling on context size.
    pub fn total_budget(&self) -> usize {
        Layer::ALL
            .iter()
            .map(|l| self.get(*l))
            .filter(|c| c.enabled)
            .map(|c| c.char_budget)
            .sum()
    }
}

/// How procedural memory reaches the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionMode {
    /// The builder retrieves and packs memory into L2 before the run.
    #[default]
    AutoInject,
    /// Memory search/get/quote are exposed as tools; L2 stays empty.
    ToolMediated,
}

/// L2 retrieval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalPolicy {
    pub mode: InjectionMode,
    pub success_k: usize,
    pub failure_k: usize,
    pub seed_k: usize,
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self {
            mode: InjectionMode::AutoInject,
            success_k: 2,
            failure_k: 1,
            seed_k: 1,
        }
    }
}

/// Execution runner bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Hard cap on reasoning/action steps.
    pub max_iterations: usize,
    /// Hard cap on language-model invocations.
    pub max_calls: usize,
    /// Tool returns longer than this many characters count as large returns.
    pub large_return_threshold: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 12,
            max_calls: 24,
            large_return_threshold: 1000,
        }
    }
}

/// Language-model endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/v1/...`).
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 1024,
            timeout_secs: 120,
        }
    }
}

/// Closed-loop learning settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnConfig {
    pub judge_temperature: f32,
    pub extract_temperature: f32,
    pub max_items: usize,
    pub dedup: bool,
    pub title_threshold: f64,
    pub content_threshold: f64,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            judge_temperature: 0.0,
            extract_temperature: 1.0,
            max_items: 3,
            dedup: true,
            title_threshold: 0.85,
            content_threshold: 0.85,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BankConfig {
    pub layers: LayerCakeConfig,
    pub retrieval: RetrievalPolicy,
    pub runner: RunnerConfig,
    pub llm: LlmConfig,
    pub learn: LearnConfig,
}

impl BankConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).map_err(|e| BankError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Apply `RBANK_LLM_BASE_URL`, `RBANK_LLM_MODEL`, `RBANK_MAX_ITERATIONS`
    /// and `RBANK_MAX_CALLS` when set.
    pub fn apply_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var("RBANK_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("RBANK_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(v) = std::env::var("RBANK_MAX_ITERATIONS") {
            self.runner.max_iterations = parse_env("RBANK_MAX_ITERATIONS", &v)?;
        }
        if let Ok(v) = std::env::var("RBANK_MAX_CALLS") {
            self.runner.max_calls = parse_env("RBANK_MAX_CALLS", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runner.max_iterations == 0 {
            return Err(BankError::Config("runner.max_iterations must be positive".into()));
        }
        if self.runner.max_calls == 0 {
            return Err(BankError::Config("runner.max_calls must be positive".into()));
        }
        for (name, t) in [
            ("learn.title_threshold", self.learn.title_threshold),
            ("learn.content_threshold", self.learn.content_threshold),
        ] {
            if !(0.0..=1.0).contains(&t) {
                return Err(BankError::Config(format!("{name} must be within [0, 1], got {t}")));
            }
        }
        Ok(())
    }
}

fn parse_env(name: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| BankError::Config(format!("{name} is not a positive integer: {value}")))
}
