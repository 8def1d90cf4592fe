//! RDF graph adapter behind the handle discipline.
//!
//! Graphs are parsed into in-memory oxigraph stores and registered under a
//! `graph_N` key in the shared [`BlobStore`], which holds a one-line
//! descriptor so `peek`/`stats` also work on graph handles. Query results
//! are serialised into the blob store and returned as `results_N` handles;
//! every other accessor is bounded by an explicit limit.
//!
//! Parse and query failures are returned to the caller verbatim so an agent
//! can read the engine's message and correct itself.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{NamedNode, Term};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use reasoningbank_state::{BlobStore, Dtype, Ref};

use crate::layers::schema::SchemaConstraints;
use crate::layers::sense::SenseCard;

pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const DEFAULT_SAMPLE: usize = 10;
pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const DEFAULT_DESCRIBE_LIMIT: usize = 20;
pub const MAX_NAMESPACES: usize = 10;

pub(crate) const PREFIXES: &str = "\
PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX owl: <http://www.w3.org/2002/07/owl#>
PREFIX skos: <http://www.w3.org/2004/02/skos/core#>
PREFIX dcterms: <http://purl.org/dc/terms/>
PREFIX dc: <http://purl.org/dc/elements/1.1/>
";

/// Errors from graph loading and querying.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("unsupported rdf format: {0}")]
    UnsupportedFormat(String),

    #[error("handle is not a loaded graph: {0}")]
    NotAGraph(String),

    #[error("invalid IRI: {0}")]
    InvalidIri(String),

    #[error("graph storage error: {0}")]
    Storage(String),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Size and vocabulary overview of a loaded graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub triples: usize,
    pub classes: usize,
    pub properties: usize,
    /// Most frequent namespaces, at most [`MAX_NAMESPACES`].
    pub namespaces: Vec<String>,
}

/// One solution row: variable name → plain term text.
pub type Row = std::collections::BTreeMap<String, String>;

/// Detect an RDF serialisation from a file extension.
pub fn detect_format(path: &Path) -> Option<RdfFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "ttl" | "turtle" => Some(RdfFormat::Turtle),
        "nt" | "ntriples" => Some(RdfFormat::NTriples),
        "nq" | "nquads" => Some(RdfFormat::NQuads),
        "trig" => Some(RdfFormat::TriG),
        "n3" => Some(RdfFormat::N3),
        "rdf" | "owl" | "xml" => Some(RdfFormat::RdfXml),
        _ => None,
    }
}

/// Plain text of a term: bare IRI for named nodes, lexical value for literals.
pub fn term_text(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_string(),
        Term::Literal(literal) => literal.value().to_string(),
        other => other.to_string(),
    }
}

/// Namespace part of an IRI: everything up to the last `#` or `/`.
pub fn namespace_of(iri: &str) -> Option<&str> {
    let idx = iri.rfind(['#', '/'])?;
    Some(&iri[..=idx])
}

/// Local part of an IRI, or the IRI itself when it has none.
pub fn local_name(iri: &str) -> &str {
    match iri.rfind(['#', '/']) {
        Some(idx) if idx + 1 < iri.len() => &iri[idx + 1..],
        _ => iri,
    }
}

/// Handle-keyed access to loaded RDF graphs.
pub struct GraphAdapter {
    blobs: Arc<BlobStore>,
    graphs: RwLock<HashMap<String, Store>>,
}

impl GraphAdapter {
    pub fn new(blobs: Arc<BlobStore>) -> Self {
        Self {
            blobs,
            graphs: RwLock::new(HashMap::new()),
        }
    }

    /// Blob store that receives graph descriptors and query results.
    pub fn blobs(&self) -> &Arc<BlobStore> {
        &self.blobs
    }

    /// Parse `path`, detecting the format from its extension.
    pub fn load(&self, path: impl AsRef<Path>) -> GraphResult<Ref> {
        let path = path.as_ref();
        let format = detect_format(path)
            .ok_or_else(|| GraphError::UnsupportedFormat(path.display().to_string()))?;
        self.load_with_format(path, format)
    }

    /// Parse `path` with an explicit format hint.
    pub fn load_with_format(&self, path: impl AsRef<Path>, format: RdfFormat) -> GraphResult<Ref> {
        let path = path.as_ref();
        let label = path.display().to_string();
        let file = std::fs::File::open(path).map_err(|e| GraphError::Parse {
            path: label.clone(),
            message: e.to_string(),
        })?;
        self.load_reader(&label, std::io::BufReader::new(file), format)
    }

    /// Parse in-memory RDF text; `label` names the source in descriptors and errors.
    pub fn load_from_str(&self, label: &str, content: &str, format: RdfFormat) -> GraphResult<Ref> {
        self.load_reader(label, content.as_bytes(), format)
    }

    fn load_reader(
        &self,
        label: &str,
        reader: impl std::io::Read,
        format: RdfFormat,
    ) -> GraphResult<Ref> {
        let store = Store::new().map_err(|e| GraphError::Storage(e.to_string()))?;
        store
            .load_from_reader(RdfParser::from_format(format), reader)
            .map_err(|e| GraphError::Parse {
                path: label.to_string(),
                message: e.to_string(),
            })?;
        let triples = store.len().map_err(|e| GraphError::Storage(e.to_string()))?;

        let handle = self.blobs.put(
            format!("RDF graph from {label} ({triples} triples)"),
            Dtype::Graph,
        );
        self.graphs.write().insert(handle.key.clone(), store);
        info!(event = "graph.loaded", key = %handle.key, source = %label, triples);
        Ok(handle)
    }

    /// Exact triple count, class and property counts, and top namespaces.
    pub fn stats(&self, key: &str) -> GraphResult<GraphStats> {
        let store = self.store(key)?;
        let triples = store.len().map_err(|e| GraphError::Storage(e.to_string()))?;
        let classes = count(
            &store,
            "SELECT (COUNT(DISTINCT ?c) AS ?n) WHERE { { ?c a owl:Class } UNION { ?c a rdfs:Class } FILTER(isIRI(?c)) }",
        )?;
        let properties = count(
            &store,
            "SELECT (COUNT(DISTINCT ?p) AS ?n) WHERE { ?p a ?t VALUES ?t { rdf:Property owl:ObjectProperty owl:DatatypeProperty owl:AnnotationProperty } }",
        )?;

        let mut ns_counts: HashMap<String, usize> = HashMap::new();
        for quad in store.iter() {
            let quad = quad.map_err(|e| GraphError::Storage(e.to_string()))?;
            if let Some(ns) = namespace_of(quad.predicate.as_str()) {
                *ns_counts.entry(ns.to_string()).or_default() += 1;
            }
            let subject = quad.subject.to_string();
            if let Some(iri) = subject.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                if let Some(ns) = namespace_of(iri) {
                    *ns_counts.entry(ns.to_string()).or_default() += 1;
                }
            }
        }
        let mut namespaces: Vec<(String, usize)> = ns_counts.into_iter().collect();
        namespaces.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Ok(GraphStats {
            triples,
            classes,
            properties,
            namespaces: namespaces
                .into_iter()
                .take(MAX_NAMESPACES)
                .map(|(ns, _)| ns)
                .collect(),
        })
    }

    /// Run a SPARQL query, keep at most `limit` rows, store the serialised
    /// rows and return a `results` handle.
    ///
    /// SELECT rows become one JSON object per line, ASK becomes `true` or
    /// `false`, CONSTRUCT/DESCRIBE become N-Triples lines.
    pub fn query(&self, key: &str, sparql: &str, limit: usize) -> GraphResult<Ref> {
        let store = self.store(key)?;
        let results = store
            .query(sparql)
            .map_err(|e| GraphError::Query(e.to_string()))?;

        let mut lines = Vec::new();
        match results {
            QueryResults::Solutions(solutions) => {
                for solution in solutions.take(limit) {
                    let solution = solution.map_err(|e| GraphError::Query(e.to_string()))?;
                    let row: serde_json::Map<String, serde_json::Value> = solution
                        .iter()
                        .map(|(var, term)| {
                            (var.as_str().to_string(), serde_json::Value::String(term_text(term)))
                        })
                        .collect();
                    lines.push(serde_json::Value::Object(row).to_string());
                }
            }
            QueryResults::Boolean(answer) => lines.push(answer.to_string()),
            QueryResults::Graph(triples) => {
                for triple in triples.take(limit) {
                    let triple = triple.map_err(|e| GraphError::Query(e.to_string()))?;
                    lines.push(format!("{triple} ."));
                }
            }
        }

        debug!(key = %key, rows = lines.len(), limit, "sparql query executed");
        Ok(self.blobs.put(lines.join("\n"), Dtype::Results))
    }

    /// Run a SELECT query and return at most `limit` rows of plain term text.
    pub fn select(&self, key: &str, sparql: &str, limit: usize) -> GraphResult<Vec<Row>> {
        let store = self.store(key)?;
        select_rows(&store, sparql, limit)
    }

    /// `n` raw triples in N-Triples form.
    pub fn sample(&self, key: &str, n: usize) -> GraphResult<String> {
        let store = self.store(key)?;
        let mut lines = Vec::new();
        for quad in store.iter().take(n) {
            let quad = quad.map_err(|e| GraphError::Storage(e.to_string()))?;
            lines.push(format!("{} {} {} .", quad.subject, quad.predicate, quad.object));
        }
        Ok(lines.join("\n"))
    }

    /// Declared class IRIs, sorted, at most `limit`.
    pub fn classes(&self, key: &str, limit: usize) -> GraphResult<Vec<String>> {
        let store = self.store(key)?;
        let sparql = format!(
            "SELECT DISTINCT ?c WHERE {{ {{ ?c a owl:Class }} UNION {{ ?c a rdfs:Class }} FILTER(isIRI(?c)) }} ORDER BY ?c LIMIT {limit}"
        );
        column(&store, &sparql, "c", limit)
    }

    /// Declared property IRIs, sorted, at most `limit`. Falls back to the
    /// predicates in use when the graph declares none.
    pub fn properties(&self, key: &str, limit: usize) -> GraphResult<Vec<String>> {
        let store = self.store(key)?;
        let declared = format!(
            "SELECT DISTINCT ?p WHERE {{ ?p a ?t VALUES ?t {{ rdf:Property owl:ObjectProperty owl:DatatypeProperty owl:AnnotationProperty }} FILTER(isIRI(?p)) }} ORDER BY ?p LIMIT {limit}"
        );
        let props = column(&store, &declared, "p", limit)?;
        if !props.is_empty() {
            return Ok(props);
        }
        let used = format!("SELECT DISTINCT ?p WHERE {{ ?s ?p ?o }} ORDER BY ?p LIMIT {limit}");
        column(&store, &used, "p", limit)
    }

    /// Triples mentioning `uri` as subject, then as object, at most `limit` in total.
    pub fn describe(&self, key: &str, uri: &str, limit: usize) -> GraphResult<String> {
        let store = self.store(key)?;
        let node = NamedNode::new(uri).map_err(|e| GraphError::InvalidIri(format!("{uri}: {e}")))?;

        let mut lines = Vec::new();
        let outgoing = format!("SELECT ?p ?o WHERE {{ {node} ?p ?o }} LIMIT {limit}");
        for row in raw_rows(&store, &outgoing, limit)? {
            if let (Some(p), Some(o)) = (row.get("p"), row.get("o")) {
                lines.push(format!("{node} {p} {o} ."));
            }
        }
        let remaining = limit.saturating_sub(lines.len());
        if remaining > 0 {
            let incoming = format!("SELECT ?s ?p WHERE {{ ?s ?p {node} }} LIMIT {remaining}");
            for row in raw_rows(&store, &incoming, remaining)? {
                if let (Some(s), Some(p)) = (row.get("s"), row.get("p")) {
                    lines.push(format!("{s} {p} {node} ."));
                }
            }
        }
        Ok(lines.join("\n"))
    }

    /// Ontology-level metadata feeding the L0 layer.
    pub fn sense_card(&self, key: &str) -> GraphResult<SenseCard> {
        SenseCard::from_graph(self, key)
    }

    /// Schema constraints feeding the L1 layer.
    pub fn schema_constraints(&self, key: &str) -> GraphResult<SchemaConstraints> {
        SchemaConstraints::from_graph(self, key)
    }

    fn store(&self, key: &str) -> GraphResult<Store> {
        self.graphs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| GraphError::NotAGraph(key.to_string()))
    }
}

fn with_prefixes(sparql: &str) -> String {
    format!("{PREFIXES}{sparql}")
}

fn solutions(
    store: &Store,
    sparql: &str,
    limit: usize,
    render: fn(&Term) -> String,
) -> GraphResult<Vec<Row>> {
    let results = store
        .query(with_prefixes(sparql).as_str())
        .map_err(|e| GraphError::Query(e.to_string()))?;
    let QueryResults::Solutions(solutions) = results else {
        return Err(GraphError::Query("expected a SELECT query".to_string()));
    };
    let mut rows = Vec::new();
    for solution in solutions.take(limit) {
        let solution = solution.map_err(|e| GraphError::Query(e.to_string()))?;
        rows.push(
            solution
                .iter()
                .map(|(var, term)| (var.as_str().to_string(), render(term)))
                .collect(),
        );
    }
    Ok(rows)
}

/// Rows with plain term text. Internal queries get the standard prefixes.
pub(crate) fn select_rows(store: &Store, sparql: &str, limit: usize) -> GraphResult<Vec<Row>> {
    solutions(store, sparql, limit, term_text)
}

fn raw_rows(store: &Store, sparql: &str, limit: usize) -> GraphResult<Vec<Row>> {
    solutions(store, sparql, limit, |term| term.to_string())
}

fn column(store: &Store, sparql: &str, var: &str, limit: usize) -> GraphResult<Vec<String>> {
    Ok(select_rows(store, sparql, limit)?
        .into_iter()
        .filter_map(|mut row| row.remove(var))
        .collect())
}

fn count(store: &Store, sparql: &str) -> GraphResult<usize> {
    let rows = select_rows(store, sparql, 1)?;
    Ok(rows
        .first()
        .and_then(|row| row.get("n"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(0))
}
