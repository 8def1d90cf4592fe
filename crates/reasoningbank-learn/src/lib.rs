//! ReasoningBank Learn: turning runs into procedural memory
//!
//! ## Layer 2 - Closed Loop
//!
//! Focus: grading completed runs, distilling reusable strategies and
//! guardrails from them, and consolidating those into the memory store that
//! later runs retrieve from.
//!
//! ## Key Components
//!
//! - `judge`: deterministic, optionally grounded verdict on one run
//! - `extract`: polarity-specific distillation of 0..=N memory items
//! - `ClosedLoopController`: judge → extract → consolidate with a `LoopRecord`
//! - `TaskPipeline`: sequential multi-task execution over one memory store

mod decode;

pub mod controller;
pub mod error;
pub mod extract;
pub mod judge;
pub mod pipeline;

pub use controller::{ClosedLoopController, LoopRecord, LoopStage};
pub use error::{LearnError, LearnResult};
pub use extract::{extract, parse_items, polarity_for};
pub use judge::{judge, try_judge, JudgeInput, Judgment};
pub use pipeline::{TaskOutcome, TaskPipeline};
