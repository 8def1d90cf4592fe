//! Closed-loop controller: judge → extract → consolidate, once per run.
//!
//! Every call ends in a terminal stage, `Stored` or `Skipped`, and returns
//! an auditable [`LoopRecord`]. The memory store is only touched by the
//! final consolidation, so an aborted loop never leaves a partial write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reasoningbank_core::{obs, LanguageModel, LearnConfig, RunResult, METRICS};
use reasoningbank_state::{DedupThresholds, MemStore};

use crate::extract::extract;
use crate::judge::{try_judge, JudgeInput, Judgment};

/// Position in the learning loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStage {
    Pending,
    Judged,
    Extracted,
    Stored,
    Skipped,
}

impl LoopStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Judged => "judged",
            Self::Extracted => "extracted",
            Self::Stored => "stored",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stored | Self::Skipped)
    }
}

impl std::fmt::Display for LoopStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit trail of one pass through the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRecord {
    pub run_id: String,
    pub task: String,
    pub stage: LoopStage,
    pub judgment: Option<Judgment>,
    /// Candidate items returned by the extractor.
    pub extracted: usize,
    pub stored_ids: Vec<String>,
    /// Titles rejected as near-duplicates.
    pub rejected_titles: Vec<String>,
    pub skip_reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl LoopRecord {
    fn pending(run: &RunResult) -> Self {
        Self {
            run_id: run.run_id.clone(),
            task: run.task.clone(),
            stage: LoopStage::Pending,
            judgment: None,
            extracted: 0,
            stored_ids: Vec::new(),
            rejected_titles: Vec::new(),
            skip_reason: None,
            recorded_at: Utc::now(),
        }
    }

    fn advance(&mut self, stage: LoopStage, detail: &str) {
        self.stage = stage;
        obs::emit_loop_stage(&self.task, stage.as_str(), detail);
    }

    fn skip(&mut self, step: &str, error: &dyn std::fmt::Display) {
        obs::emit_loop_error(&self.task, step, error);
        self.skip_reason = Some(format!("{step} failed: {error}"));
        self.advance(LoopStage::Skipped, step);
    }

    /// Whether the loop added at least one item.
    pub fn learned(&self) -> bool {
        !self.stored_ids.is_empty()
    }
}

/// Turns completed runs into memory items.
pub struct ClosedLoopController {
    model: Arc<dyn LanguageModel>,
    cfg: LearnConfig,
}

impl ClosedLoopController {
    pub fn new(model: Arc<dyn LanguageModel>, cfg: LearnConfig) -> Self {
        Self { model, cfg }
    }

    pub fn config(&self) -> &LearnConfig {
        &self.cfg
    }

    fn thresholds(&self) -> Option<DedupThresholds> {
        self.cfg.dedup.then(|| DedupThresholds {
            title: self.cfg.title_threshold,
            content: self.cfg.content_threshold,
        })
    }

    /// Judge `run`, extract items from it and consolidate them into `mem`.
    ///
    /// `grounding` is handed to the judge so it can reject answers that
    /// talk about the wrong ontology.
    pub async fn process(
        &self,
        run: &RunResult,
        mem: &mut MemStore,
        grounding: Option<&str>,
    ) -> LoopRecord {
        let mut record = LoopRecord::pending(run);

        let input = JudgeInput {
            task: &run.task,
            answer: &run.answer,
            query: run.query.as_deref(),
            grounding,
        };
        let verdict = try_judge(self.model.as_ref(), &input, self.cfg.judge_temperature).await;
        let judgment = match verdict {
            Ok(judgment) => judgment,
            Err(e) => {
                record.judgment = Some(Judgment::judge_error());
                record.skip("judge", &e);
                return record;
            }
        };
        record.judgment = Some(judgment.clone());
        record.advance(LoopStage::Judged, &format!("success={}", judgment.success));

        let items = match extract(
            self.model.as_ref(),
            run,
            &judgment,
            self.cfg.extract_temperature,
            self.cfg.max_items,
        )
        .await
        {
            Ok(items) => items,
            Err(e) => {
                record.skip("extract", &e);
                return record;
            }
        };
        record.extracted = items.len();
        record.advance(LoopStage::Extracted, &format!("items={}", items.len()));

        let report = mem.consolidate_with(items, self.thresholds());
        METRICS.add_items_stored(report.added.len() as u64);
        METRICS.add_duplicates_rejected(report.rejected.len() as u64);
        record.stored_ids = report.added;
        record.rejected_titles = report.rejected;
        record.advance(
            LoopStage::Stored,
            &format!(
                "stored={} rejected={}",
                record.stored_ids.len(),
                record.rejected_titles.len()
            ),
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reasoningbank_core::fakes::ScriptedModel;
    use reasoningbank_core::LeakageMetrics;
    use reasoningbank_state::Polarity;

    fn run(answer: &str) -> RunResult {
        RunResult {
            run_id: "run-1".into(),
            task: "What is Activity?".into(),
            answer: answer.into(),
            query: Some("SELECT ?s WHERE { ?s a prov:Activity }".into()),
            converged: true,
            iteration_count: 1,
            leakage: LeakageMetrics::default(),
            trajectory: vec![],
            context: String::new(),
            memory_ids: vec![],
            exhausted: None,
            error: None,
            started_at: Utc::now(),
            duration_ms: 1,
        }
    }

    const ITEMS: &str = r#"[{"title": "Query by rdf:type", "description": "class questions", "content": "Use ?x a prov:Activity."}]"#;

    fn controller(model: ScriptedModel) -> (Arc<ScriptedModel>, ClosedLoopController) {
        let model = Arc::new(model);
        let ctl = ClosedLoopController::new(model.clone(), LearnConfig::default());
        (model, ctl)
    }

    #[tokio::test]
    async fn test_success_path_stores_items() {
        let (model, ctl) = controller(ScriptedModel::new([
            r#"{"success": true, "reason": "correct"}"#,
            ITEMS,
        ]));
        let mut mem = MemStore::new();
        let record = ctl.process(&run("A PROV class"), &mut mem, None).await;

        assert_eq!(record.stage, LoopStage::Stored);
        assert!(record.learned());
        assert_eq!(record.extracted, 1);
        assert_eq!(mem.len(), 1);
        assert_eq!(mem.items()[0].source_polarity, Polarity::Success);

        let requests = model.requests();
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[1].temperature, 1.0);
    }

    #[tokio::test]
    async fn test_failed_judgment_learns_guardrails() {
        let (_, ctl) = controller(ScriptedModel::new([
            r#"{"success": false, "reason": "wrong ontology"}"#,
            ITEMS,
        ]));
        let mut mem = MemStore::new();
        let record = ctl.process(&run("Brick schema"), &mut mem, None).await;

        assert_eq!(record.stage, LoopStage::Stored);
        assert_eq!(mem.items()[0].source_polarity, Polarity::Failure);
    }

    #[tokio::test]
    async fn test_judge_failure_skips_without_writing() {
        let (model, ctl) = controller(ScriptedModel::new(["I think so"]));
        let mut mem = MemStore::new();
        let record = ctl.process(&run("x"), &mut mem, None).await;

        assert_eq!(record.stage, LoopStage::Skipped);
        assert!(record.judgment.as_ref().unwrap().is_judge_error());
        assert!(record.skip_reason.unwrap().starts_with("judge failed: malformed judge output"));
        assert!(mem.is_empty());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_extract_failure_skips_without_writing() {
        let (_, ctl) = controller(ScriptedModel::new([
            r#"{"success": true, "reason": "ok"}"#,
            "no items, sorry",
        ]));
        let mut mem = MemStore::new();
        let record = ctl.process(&run("x"), &mut mem, None).await;

        assert_eq!(record.stage, LoopStage::Skipped);
        assert!(record.judgment.unwrap().success);
        assert!(mem.is_empty());
    }

    #[tokio::test]
    async fn test_zero_items_is_stored_with_nothing() {
        let (_, ctl) = controller(ScriptedModel::new([
            r#"{"success": true, "reason": "ok"}"#,
            "[]",
        ]));
        let mut mem = MemStore::new();
        let record = ctl.process(&run("x"), &mut mem, None).await;

        assert_eq!(record.stage, LoopStage::Stored);
        assert!(!record.learned());
        assert!(record.stage.is_terminal());
    }

    #[tokio::test]
    async fn test_consolidation_is_idempotent() {
        let (_, ctl) = controller(ScriptedModel::new([
            r#"{"success": true, "reason": "ok"}"#,
            ITEMS,
            r#"{"success": true, "reason": "ok"}"#,
            ITEMS,
        ]));
        let mut mem = MemStore::new();
        ctl.process(&run("x"), &mut mem, None).await;
        let second = ctl.process(&run("x"), &mut mem, None).await;

        assert_eq!(mem.len(), 1);
        assert_eq!(second.rejected_titles, vec!["Query by rdf:type".to_string()]);
        assert!(second.stored_ids.is_empty());
    }
}
