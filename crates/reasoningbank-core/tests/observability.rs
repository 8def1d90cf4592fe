//! Observability tests for run and loop lifecycle tracing.
//!
//! Event names are asserted against captured logs; run-level
//! counters are checked as lower bounds because tests share the process.

use std::sync::Arc;

use oxigraph::io::RdfFormat;
use reasoningbank_core::fakes::ScriptedModel;
use reasoningbank_core::obs::{
    emit_layer_packed, emit_loop_error, emit_loop_stage, emit_run_finished, emit_run_started,
    emit_tool_called, RunSpan,
};
use reasoningbank_core::{BankConfig, ExecutionRunner, GraphAdapter, Layer, METRICS};
use reasoningbank_state::BlobStore;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_emit_run_started_and_finished() {
    emit_run_started("run-123", "List the classes", 512);
    emit_run_finished("run-123", 4, true, 37);
    assert!(logs_contain("run.started"));
    assert!(logs_contain("run.finished"));
    assert!(logs_contain("run-123"));
}

#[traced_test]
#[test]
fn test_emit_tool_called_both_levels() {
    emit_tool_called("graph_sample", 8000, true, true);
    emit_tool_called("graph_stats", 120, false, true);
    emit_tool_called("blob_peek", 40, false, false);
    assert!(logs_contain("tool.large_return"));
    assert!(logs_contain("graph_sample"));
    assert!(logs_contain("tool.called"));
}

#[traced_test]
#[test]
fn test_emit_layer_packed() {
    for layer in Layer::ALL {
        emit_layer_packed(layer, 10, 100);
    }
    assert!(logs_contain("context.layer_packed"));
}

#[traced_test]
#[test]
fn test_emit_loop_events() {
    emit_loop_stage("What is Activity?", "judged", "success=true");
    emit_loop_error("What is Activity?", "extract", &"malformed extractor output");
    assert!(logs_contain("loop.stage"));
    assert!(logs_contain("loop.error"));
    assert!(logs_contain("malformed extractor output"));
}

#[traced_test]
#[test]
fn test_run_span_enter() {
    let span = RunSpan::enter("span-run");
    emit_tool_called("graph_classes", 10, false, true);
    drop(span);
    assert!(logs_contain("span-run"));
}

#[traced_test]
#[tokio::test]
async fn test_run_updates_process_counters() {
    let runs_before = METRICS.runs();
    let calls_before = METRICS.tool_calls();

    let graph = GraphAdapter::new(Arc::new(BlobStore::new()));
    let handle = graph
        .load_from_str(
            "t.ttl",
            "<http://example.org/a> <http://example.org/p> <http://example.org/b> .",
            RdfFormat::NTriples,
        )
        .expect("load fixture");
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "graph_stats"}"#,
        r#"{"submit": {"answer": "one triple"}}"#,
    ]));
    let result = ExecutionRunner::new(model, BankConfig::default())
        .run_loaded(&graph, &handle.key, "How big is it?", None)
        .await
        .expect("run");

    assert!(result.converged);
    assert!(METRICS.runs() > runs_before);
    assert!(METRICS.tool_calls() > calls_before);
    assert!(logs_contain("run.finished"));
}
