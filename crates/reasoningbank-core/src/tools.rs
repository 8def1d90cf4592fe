//! Bounded tool set handed to the execution engine.
//!
//! Three pieces:
//! - [`ToolRegistry`]: typed specs (name, group, required/optional fields)
//!   rendered into the prompt
//! - [`BankTools`]: the one [`ToolAdapter`] that turns JSON arguments into
//!   typed calls on the graph adapter, blob store and memory store
//! - [`ToolBox`]: validates each invocation against its spec, measures the
//!   returned text and accumulates [`LeakageMetrics`]
//!
//! Tool failures are values, not panics: the runner feeds their text back to
//! the agent so it can correct its next call.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use reasoningbank_state::{
    MemStore, Polarity, DEFAULT_GET_MAX, DEFAULT_PEEK_CHARS, DEFAULT_QUOTE_CHARS, DEFAULT_SEARCH_K,
};

use crate::graph::{
    GraphAdapter, DEFAULT_DESCRIBE_LIMIT, DEFAULT_LIST_LIMIT, DEFAULT_QUERY_LIMIT, DEFAULT_SAMPLE,
};
use crate::metrics::{LeakageMetrics, METRICS};
use crate::obs;

/// Ceiling on any row/triple limit an agent may request.
pub const MAX_TOOL_LIMIT: usize = 500;

/// Which store a tool reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolGroup {
    Graph,
    Blob,
    Memory,
}

/// Top-level argument fields of a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonFieldSchema {
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub optional_fields: Vec<String>,
}

impl JsonFieldSchema {
    pub fn required<const N: usize>(fields: [&str; N]) -> Self {
        Self {
            required_fields: fields.iter().map(|f| (*f).to_string()).collect(),
            optional_fields: Vec::new(),
        }
    }

    pub fn optional<const N: usize>(mut self, fields: [&str; N]) -> Self {
        self.optional_fields
            .extend(fields.iter().map(|f| (*f).to_string()));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSpec {
    pub name: String,
    pub group: ToolGroup,
    pub description: String,
    pub input_schema: JsonFieldSchema,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        group: ToolGroup,
        description: impl Into<String>,
        input_schema: JsonFieldSchema,
    ) -> Self {
        Self {
            name: name.into(),
            group,
            description: description.into(),
            input_schema,
        }
    }

    /// `name(required, [optional]): description`
    pub fn signature(&self) -> String {
        let args: Vec<String> = self
            .input_schema
            .required_fields
            .iter()
            .cloned()
            .chain(self.input_schema.optional_fields.iter().map(|f| format!("[{f}]")))
            .collect();
        format!("{}({}): {}", self.name, args.join(", "), self.description)
    }
}

/// Ordered tool registry; registration order is prompt order.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn register(&mut self, spec: ToolSpec) -> Result<(), ToolError> {
        if self.get(&spec.name).is_some() {
            return Err(ToolError::DuplicateTool {
                tool_name: spec.name,
            });
        }
        self.tools.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn has_group(&self, group: ToolGroup) -> bool {
        self.tools.iter().any(|t| t.group == group)
    }

    /// One bullet per tool, for the system prompt.
    pub fn render(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("- {}", t.signature()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The workbench tool set. Memory tools are included only for
    /// tool-mediated retrieval.
    pub fn bank(include_memory: bool) -> Self {
        let mut specs = vec![
            ToolSpec::new(
                "graph_stats",
                ToolGroup::Graph,
                "triple, class and property counts plus top namespaces",
                JsonFieldSchema::default().optional(["graph"]),
            ),
            ToolSpec::new(
                "graph_query",
                ToolGroup::Graph,
                "run SPARQL; returns a results handle, inspect it with blob_peek/blob_slice",
                JsonFieldSchema::required(["sparql"]).optional(["graph", "limit"]),
            ),
            ToolSpec::new(
                "graph_sample",
                ToolGroup::Graph,
                "a few raw triples",
                JsonFieldSchema::default().optional(["graph", "n"]),
            ),
            ToolSpec::new(
                "graph_classes",
                ToolGroup::Graph,
                "declared class IRIs",
                JsonFieldSchema::default().optional(["graph", "limit"]),
            ),
            ToolSpec::new(
                "graph_properties",
                ToolGroup::Graph,
                "declared (or used) property IRIs",
                JsonFieldSchema::default().optional(["graph", "limit"]),
            ),
            ToolSpec::new(
                "graph_describe",
                ToolGroup::Graph,
                "triples about one IRI",
                JsonFieldSchema::required(["uri"]).optional(["graph", "limit"]),
            ),
            ToolSpec::new(
                "blob_peek",
                ToolGroup::Blob,
                "first n characters behind a handle",
                JsonFieldSchema::required(["key"]).optional(["n"]),
            ),
            ToolSpec::new(
                "blob_slice",
                ToolGroup::Blob,
                "characters [start, end) behind a handle",
                JsonFieldSchema::required(["key", "start", "end"]),
            ),
            ToolSpec::new(
                "blob_stats",
                ToolGroup::Blob,
                "size and line count behind a handle",
                JsonFieldSchema::required(["key"]),
            ),
        ];
        if include_memory {
            specs.extend([
                ToolSpec::new(
                    "mem_search",
                    ToolGroup::Memory,
                    "memory previews (id, title, desc, src) ranked by keyword overlap",
                    JsonFieldSchema::required(["query"]).optional(["k", "polarity"]),
                ),
                ToolSpec::new(
                    "mem_get",
                    ToolGroup::Memory,
                    "full memory items for at most 3 ids",
                    JsonFieldSchema::required(["ids"]),
                ),
                ToolSpec::new(
                    "mem_quote",
                    ToolGroup::Memory,
                    "bounded excerpt of one item's content",
                    JsonFieldSchema::required(["id"]).optional(["max_chars"]),
                ),
            ]);
        }

        Self { tools: specs }
    }
}

/// Tool call request as decoded from the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub input: Value,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, input: Value) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("duplicate tool registration: {tool_name}")]
    DuplicateTool { tool_name: String },

    #[error("tool '{tool_name}' is missing required field '{field}'")]
    SchemaViolation { tool_name: String, field: String },

    #[error("tool '{tool_name}' got an invalid '{field}': {message}")]
    InvalidArgument {
        tool_name: String,
        field: String,
        message: String,
    },

    #[error("tool '{tool_name}' failed: {message}")]
    Adapter { tool_name: String, message: String },
}

pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Adapter contract for actual tool invocation.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    async fn call(&self, tool_name: &str, input: &Value) -> ToolResult<String>;
}

/// Dispatches workbench tools against one loaded graph and an optional
/// memory store.
pub struct BankTools<'a> {
    graph: &'a GraphAdapter,
    graph_key: String,
    mem: Option<&'a MemStore>,
}

impl<'a> BankTools<'a> {
    pub fn new(graph: &'a GraphAdapter, graph_key: impl Into<String>) -> Self {
        Self {
            graph,
            graph_key: graph_key.into(),
            mem: None,
        }
    }

    pub fn with_memory(mut self, mem: &'a MemStore) -> Self {
        self.mem = Some(mem);
        self
    }

    fn dispatch(&self, tool: &str, input: &Value) -> ToolResult<String> {
        let fail = |e: &dyn std::fmt::Display| ToolError::Adapter {
            tool_name: tool.to_string(),
            message: e.to_string(),
        };
        let graph_key = opt_str(tool, input, "graph")?.unwrap_or(self.graph_key.as_str());

        match tool {
            "graph_stats" => {
                let stats = self.graph.stats(graph_key).map_err(|e| fail(&e))?;
                serde_json::to_string(&stats).map_err(|e| fail(&e))
            }
            "graph_query" => {
                let sparql = req_str(tool, input, "sparql")?;
                let limit = opt_usize(tool, input, "limit", DEFAULT_QUERY_LIMIT)?;
                let handle = self
                    .graph
                    .query(graph_key, sparql, limit.min(MAX_TOOL_LIMIT))
                    .map_err(|e| fail(&e))?;
                Ok(handle.to_string())
            }
            "graph_sample" => {
                let n = opt_usize(tool, input, "n", DEFAULT_SAMPLE)?;
                self.graph
                    .sample(graph_key, n.min(MAX_TOOL_LIMIT))
                    .map_err(|e| fail(&e))
            }
            "graph_classes" | "graph_properties" => {
                let limit =
                    opt_usize(tool, input, "limit", DEFAULT_LIST_LIMIT)?.min(MAX_TOOL_LIMIT);
                let list = if tool == "graph_classes" {
                    self.graph.classes(graph_key, limit)
                } else {
                    self.graph.properties(graph_key, limit)
                };
                Ok(list.map_err(|e| fail(&e))?.join("\n"))
            }
            "graph_describe" => {
                let uri = req_str(tool, input, "uri")?;
                let limit = opt_usize(tool, input, "limit", DEFAULT_DESCRIBE_LIMIT)?;
                self.graph
                    .describe(graph_key, uri, limit.min(MAX_TOOL_LIMIT))
                    .map_err(|e| fail(&e))
            }
            "blob_peek" => {
                let key = req_str(tool, input, "key")?;
                let n = opt_usize(tool, input, "n", DEFAULT_PEEK_CHARS)?;
                self.graph.blobs().peek(key, n).map_err(|e| fail(&e))
            }
            "blob_slice" => {
                let key = req_str(tool, input, "key")?;
                let start = req_usize(tool, input, "start")?;
                let end = req_usize(tool, input, "end")?;
                self.graph
                    .blobs()
                    .slice(key, start, end)
                    .map_err(|e| fail(&e))
            }
            "blob_stats" => {
                let key = req_str(tool, input, "key")?;
                let stats = self.graph.blobs().stats(key).map_err(|e| fail(&e))?;
                serde_json::to_string(&stats).map_err(|e| fail(&e))
            }
            "mem_search" | "mem_get" | "mem_quote" => {
                let mem = self.mem.ok_or_else(|| fail(&"no memory store attached"))?;
                self.dispatch_memory(mem, tool, input)
            }
            other => Err(ToolError::UnknownTool {
                tool_name: other.to_string(),
            }),
        }
    }

    fn dispatch_memory(&self, mem: &MemStore, tool: &str, input: &Value) -> ToolResult<String> {
        let fail = |e: &dyn std::fmt::Display| ToolError::Adapter {
            tool_name: tool.to_string(),
            message: e.to_string(),
        };
        match tool {
            "mem_search" => {
                let query = req_str(tool, input, "query")?;
                let k = opt_usize(tool, input, "k", DEFAULT_SEARCH_K)?.min(MAX_TOOL_LIMIT);
                let polarity = match opt_str(tool, input, "polarity")? {
                    Some(p) => Some(p.parse::<Polarity>().map_err(|message| {
                        ToolError::InvalidArgument {
                            tool_name: tool.to_string(),
                            field: "polarity".to_string(),
                            message,
                        }
                    })?),
                    None => None,
                };
                serde_json::to_string(&mem.search(query, k, polarity)).map_err(|e| fail(&e))
            }
            "mem_get" => {
                let ids = string_list(tool, input, "ids")?;
                let items = mem.get(&ids, DEFAULT_GET_MAX).map_err(|e| fail(&e))?;
                serde_json::to_string(&items).map_err(|e| fail(&e))
            }
            _ => {
                let id = req_str(tool, input, "id")?;
                let max_chars = opt_usize(tool, input, "max_chars", DEFAULT_QUOTE_CHARS)?;
                mem.quote(id, max_chars).map_err(|e| fail(&e))
            }
        }
    }
}

#[async_trait]
impl<'a> ToolAdapter for BankTools<'a> {
    async fn call(&self, tool_name: &str, input: &Value) -> ToolResult<String> {
        self.dispatch(tool_name, input)
    }
}

/// Validating, instrumented front of a [`ToolAdapter`].
pub struct ToolBox<'a> {
    registry: ToolRegistry,
    adapter: Box<dyn ToolAdapter + 'a>,
    large_return_threshold: usize,
    leakage: Mutex<LeakageMetrics>,
}

impl<'a> ToolBox<'a> {
    pub fn new(
        registry: ToolRegistry,
        adapter: impl ToolAdapter + 'a,
        large_return_threshold: usize,
    ) -> Self {
        Self {
            registry,
            adapter: Box::new(adapter),
            large_return_threshold,
            leakage: Mutex::new(LeakageMetrics::default()),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Validate, invoke and measure one tool call. The text of an error
    /// counts toward `stdout_chars` just like a successful return.
    pub async fn execute(&self, call: &ToolInvocation) -> ToolResult<String> {
        let result = self.invoke(call).await;
        let chars = match &result {
            Ok(text) => text.chars().count(),
            Err(e) => e.to_string().chars().count(),
        };
        let large = self
            .leakage
            .lock()
            .record_return(&call.name, chars, self.large_return_threshold);

        METRICS.inc_tool_calls();
        if large {
            METRICS.inc_large_returns();
        }
        obs::emit_tool_called(&call.name, chars, large, result.is_ok());
        result
    }

    async fn invoke(&self, call: &ToolInvocation) -> ToolResult<String> {
        let spec = self
            .registry
            .get(&call.name)
            .ok_or_else(|| ToolError::UnknownTool {
                tool_name: call.name.clone(),
            })?;
        validate_schema(&call.name, &spec.input_schema, &call.input)?;
        self.adapter.call(&call.name, &call.input).await
    }

    /// Count one language-model invocation against this run.
    pub fn record_subcall(&self) {
        self.leakage.lock().record_subcall();
    }

    /// Snapshot of the metrics accumulated so far.
    pub fn leakage(&self) -> LeakageMetrics {
        self.leakage.lock().clone()
    }
}

fn validate_schema(tool_name: &str, schema: &JsonFieldSchema, payload: &Value) -> ToolResult<()> {
    for field in &schema.required_fields {
        if payload.get(field).map_or(true, Value::is_null) {
            return Err(ToolError::SchemaViolation {
                tool_name: tool_name.to_string(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

fn invalid(tool: &str, field: &str, message: &str) -> ToolError {
    ToolError::InvalidArgument {
        tool_name: tool.to_string(),
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn opt_str<'v>(tool: &str, input: &'v Value, field: &str) -> ToolResult<Option<&'v str>> {
    match input.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(invalid(tool, field, "expected a string")),
    }
}

fn req_str<'v>(tool: &str, input: &'v Value, field: &str) -> ToolResult<&'v str> {
    opt_str(tool, input, field)?.ok_or_else(|| ToolError::SchemaViolation {
        tool_name: tool.to_string(),
        field: field.to_string(),
    })
}

fn opt_usize(tool: &str, input: &Value, field: &str, default: usize) -> ToolResult<usize> {
    match input.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| invalid(tool, field, "expected a non-negative integer")),
    }
}

fn req_usize(tool: &str, input: &Value, field: &str) -> ToolResult<usize> {
    input
        .get(field)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| invalid(tool, field, "expected a non-negative integer"))
}

/// A JSON array of strings, or a single string.
fn string_list(tool: &str, input: &Value, field: &str) -> ToolResult<Vec<String>> {
    match input.get(field) {
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(values)) => {
            let mut seen = HashSet::new();
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                let s = v
                    .as_str()
                    .ok_or_else(|| invalid(tool, field, "expected an array of strings"))?;
                if seen.insert(s) {
                    out.push(s.to_string());
                }
            }
            Ok(out)
        }
        _ => Err(invalid(tool, field, "expected an array of strings")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use oxigraph::io::RdfFormat;
    use reasoningbank_state::{BlobStore, Item};
    use serde_json::json;

    const TTL: &str = r#"
@prefix ex: <http://example.org/onto#> .
@prefix owl: <http://www.w3.org/2002/07/owl#> .
ex:Agent a owl:Class .
ex:Activity a owl:Class .
ex:run1 a ex:Activity .
"#;

    fn graph() -> (GraphAdapter, String) {
        let adapter = GraphAdapter::new(Arc::new(BlobStore::new()));
        let r = adapter
            .load_from_str("t.ttl", TTL, RdfFormat::Turtle)
            .unwrap();
        (adapter, r.key)
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut reg = ToolRegistry::default();
        let spec = ToolSpec::new("x", ToolGroup::Blob, "d", JsonFieldSchema::default());
        reg.register(spec.clone()).unwrap();
        assert!(matches!(
            reg.register(spec),
            Err(ToolError::DuplicateTool { .. })
        ));
    }

    #[test]
    fn test_bank_registry_memory_toggle() {
        assert!(!ToolRegistry::bank(false).has_group(ToolGroup::Memory));
        let with_mem = ToolRegistry::bank(true);
        assert!(with_mem.get("mem_get").is_some());
        assert_eq!(with_mem.len(), ToolRegistry::bank(false).len() + 3);
        assert!(with_mem
            .render()
            .contains("- graph_query(sparql, [graph], [limit]):"));
    }

    #[tokio::test]
    async fn test_query_returns_handle_not_rows() {
        let (adapter, key) = graph();
        let tools = BankTools::new(&adapter, key);
        let out = tools
            .call(
                "graph_query",
                &json!({"sparql": "SELECT ?c WHERE { ?c a <http://www.w3.org/2002/07/owl#Class> }"}),
            )
            .await
            .unwrap();
        assert!(out.starts_with("Ref(key=results_"));
    }

    #[tokio::test]
    async fn test_toolbox_validates_and_counts() {
        let (adapter, key) = graph();
        let toolbox = ToolBox::new(ToolRegistry::bank(false), BankTools::new(&adapter, key), 10);

        let err = toolbox
            .execute(&ToolInvocation::new("graph_describe", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SchemaViolation { ref field, .. } if field == "uri"));

        let err = toolbox
            .execute(&ToolInvocation::new("mem_search", json!({"query": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool { .. }));

        toolbox
            .execute(&ToolInvocation::new("graph_classes", json!({})))
            .await
            .unwrap();

        let leakage = toolbox.leakage();
        assert_eq!(leakage.tool_calls, 3);
        assert!(leakage.large_returns >= 1);
        assert!(leakage.large_return_tools.contains(&"graph_classes".to_string()));
    }

    #[tokio::test]
    async fn test_memory_tools_enforce_get_cap() {
        let (adapter, key) = graph();
        let mut mem = MemStore::new();
        let ids: Vec<String> = (0..4)
            .map(|i| mem.add(Item::new(format!("t{i}"), "d", format!("c{i}"), Polarity::Seed)))
            .collect();
        let tools = BankTools::new(&adapter, key).with_memory(&mem);

        let err = tools
            .call("mem_get", &json!({ "ids": ids }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("at most 3"));

        let one = tools
            .call("mem_get", &json!({ "ids": ids[0] }))
            .await
            .unwrap();
        assert!(one.contains("\"content\":\"c0\""));

        let bad = tools
            .call("mem_search", &json!({"query": "t", "polarity": "maybe"}))
            .await
            .unwrap_err();
        assert!(matches!(bad, ToolError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_unknown_handle_is_tool_error() {
        let (adapter, key) = graph();
        let tools = BankTools::new(&adapter, key);
        let err = tools
            .call("blob_peek", &json!({"key": "results_999"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("results_999"));
    }
}
