//! End-to-end execution runner behaviour with a scripted model.

use std::sync::Arc;

use reasoningbank_core::fakes::ScriptedModel;
use reasoningbank_core::{
    read_run_artifact, write_run_artifact, BankConfig, ExecutionRunner, ExhaustReason,
    InjectionMode,
};
use reasoningbank_state::{Item, MemStore, Polarity};
use tempfile::tempdir;

const TTL: &str = r#"
@prefix ex: <http://example.org/onto#> .
@prefix owl: <http://www.w3.org/2002/07/owl#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
ex:Activity a owl:Class ; rdfs:label "Activity" .
ex:Agent a owl:Class ; rdfs:label "Agent" .
ex:Entity a owl:Class ; rdfs:label "Entity" .
"#;

fn write_graph(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("onto.ttl");
    std::fs::write(&path, TTL).unwrap();
    path
}

fn cfg(max_iterations: usize, max_calls: usize) -> BankConfig {
    let mut cfg = BankConfig::default();
    cfg.runner.max_iterations = max_iterations;
    cfg.runner.max_calls = max_calls;
    cfg
}

#[tokio::test]
async fn run_loads_graph_from_path_and_converges() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = write_graph(dir.path());
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "graph_query", "args": {"sparql": "SELECT ?c WHERE { ?c a <http://www.w3.org/2002/07/owl#Class> }"}}"#,
        r#"{"tool": "blob_peek", "args": {"key": "results_1", "n": 400}}"#,
        r#"{"submit": {"answer": "Three classes", "sparql": "SELECT ?c WHERE { ?c a owl:Class }"}}"#,
    ]));
    let runner = ExecutionRunner::new(model.clone(), cfg(6, 6));
    let result = runner.run("How many classes?", &path, None).await?;

    assert!(result.converged);
    assert_eq!(result.answer, "Three classes");
    assert_eq!(result.iteration_count, 3);
    assert!(result.trajectory[0].output.contains("key=results_1"));
    assert!(result.trajectory[1].output.contains("onto#Agent"));
    assert_eq!(result.leakage.large_returns, 0);
    Ok(())
}

#[tokio::test]
async fn iteration_cap_is_never_exceeded() {
    let dir = tempdir().unwrap();
    let path = write_graph(dir.path());
    for n in [1, 2, 5, 8] {
        let model = Arc::new(ScriptedModel::default().with_fallback(r#"{"tool": "graph_sample"}"#));
        let result = ExecutionRunner::new(model, cfg(n, 100))
            .run("never finishes", &path, None)
            .await
            .unwrap();
        assert!(result.trajectory.len() <= n);
        assert_eq!(result.iteration_count, n);
        assert!(!result.converged);
        assert_eq!(result.exhausted, Some(ExhaustReason::Iterations));
    }
}

#[tokio::test]
async fn oversized_tool_return_is_flagged() {
    let dir = tempdir().unwrap();
    let path = write_graph(dir.path());
    let mut config = cfg(4, 4);
    config.runner.large_return_threshold = 50;
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "graph_sample", "args": {"n": 20}}"#,
        r#"{"submit": {"answer": "done"}}"#,
    ]));
    let result = ExecutionRunner::new(model, config)
        .run("dump", &path, None)
        .await
        .unwrap();

    assert_eq!(result.leakage.large_returns, 1);
    assert_eq!(result.leakage.large_return_tools, vec!["graph_sample".to_string()]);
    assert!(result.leakage.stdout_chars > 50);
    assert_eq!(result.leakage.subcalls, 2);
}

#[tokio::test]
async fn tool_mediated_run_reaches_memory_through_tools() {
    let dir = tempdir().unwrap();
    let path = write_graph(dir.path());
    let mut mem = MemStore::new();
    let id = mem.add(Item::new(
        "Use TYPE for class queries",
        "instances of a class",
        "Query ?x a ex:Activity.",
        Polarity::Success,
    ));

    let mut config = cfg(5, 5);
    config.retrieval.mode = InjectionMode::ToolMediated;
    let get = format!(r#"{{"tool": "mem_get", "args": {{"ids": ["{id}"]}}}}"#);
    let model = Arc::new(ScriptedModel::new([
        r#"{"tool": "mem_search", "args": {"query": "class queries", "polarity": "success"}}"#
            .to_string(),
        get,
        r#"{"submit": {"answer": "ok"}}"#.to_string(),
    ]));
    let result = ExecutionRunner::new(model.clone(), config)
        .run("class queries", &path, Some(&mem))
        .await
        .unwrap();

    assert!(result.memory_ids.is_empty());
    assert!(!result.context.contains("Strategies:"));
    assert!(result.trajectory[0].output.contains(&id));
    assert!(!result.trajectory[0].output.contains("Query ?x a ex:Activity."));
    assert!(result.trajectory[1].output.contains("Query ?x a ex:Activity."));
}

#[tokio::test]
async fn auto_inject_places_memory_in_context() {
    let dir = tempdir().unwrap();
    let path = write_graph(dir.path());
    let mut mem = MemStore::new();
    let id = mem.add(Item::new("Seeded tip", "d", "Read the card.", Polarity::Seed));
    let model = Arc::new(ScriptedModel::new([r#"{"submit": {"answer": "x"}}"#]));

    let result = ExecutionRunner::new(model.clone(), cfg(3, 3))
        .run("anything", &path, Some(&mem))
        .await
        .unwrap();

    assert_eq!(result.memory_ids, vec![id]);
    assert!(result.context.contains("General Strategies:\n- Seeded tip: Read the card."));
    assert!(model.requests()[0].transcript().contains("Seeded tip"));
    assert!(!model.requests()[0].transcript().contains("mem_search"));
}

#[tokio::test]
async fn result_artifact_roundtrips() {
    let dir = tempdir().unwrap();
    let path = write_graph(dir.path());
    let model = Arc::new(ScriptedModel::new([r#"{"submit": {"answer": "A class"}}"#]));
    let result = ExecutionRunner::new(model, cfg(2, 2))
        .run("What is Activity?", &path, None)
        .await
        .unwrap();

    let out = dir.path().join("runs");
    write_run_artifact(&result, &out).unwrap();
    let back = read_run_artifact(&result.run_id, &out).unwrap();
    assert_eq!(back, result);
}

#[tokio::test]
async fn unparsable_graph_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.ttl");
    std::fs::write(&path, "this is not turtle <<<").unwrap();
    let model = Arc::new(ScriptedModel::default());
    let err = ExecutionRunner::new(model, cfg(2, 2))
        .run("t", &path, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to parse"));
}
