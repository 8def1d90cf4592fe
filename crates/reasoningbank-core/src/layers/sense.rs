//! L0 sense card: a compact overview of the ontology.
//!
//! Truncation priority: title/description, size stats, namespaces, imports,
//! label/description conventions.

use serde::{Deserialize, Serialize};

use super::LineBudget;
use crate::graph::{local_name, GraphAdapter, GraphResult};

const MAX_IMPORTS: usize = 20;

const LABEL_PREDICATES: &[&str] = &[
    "http://www.w3.org/2000/01/rdf-schema#label",
    "http://www.w3.org/2004/02/skos/core#prefLabel",
    "http://www.w3.org/2004/02/skos/core#altLabel",
    "http://purl.org/dc/terms/title",
    "http://purl.org/dc/elements/1.1/title",
];

const DESCRIPTION_PREDICATES: &[&str] = &[
    "http://www.w3.org/2000/01/rdf-schema#comment",
    "http://www.w3.org/2004/02/skos/core#definition",
    "http://purl.org/dc/terms/description",
    "http://purl.org/dc/elements/1.1/description",
    "http://purl.obolibrary.org/obo/IAO_0000115",
];

/// Ontology-level metadata extracted from a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenseCard {
    pub ontology_iri: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub triples: usize,
    pub classes: usize,
    pub properties: usize,
    pub namespaces: Vec<String>,
    pub imports: Vec<String>,
    /// Label predicates in use, most frequent first.
    pub label_predicates: Vec<String>,
    /// Description predicates in use, most frequent first.
    pub description_predicates: Vec<String>,
}

impl SenseCard {
    /// Extract the card from a loaded graph.
    pub fn from_graph(graph: &GraphAdapter, key: &str) -> GraphResult<Self> {
        let stats = graph.stats(key)?;

        let header = graph.select(
            key,
            "SELECT ?o ?title ?desc WHERE { ?o a owl:Ontology . \
             OPTIONAL { ?o dcterms:title|dc:title|rdfs:label ?title } \
             OPTIONAL { ?o dcterms:description|dc:description|rdfs:comment ?desc } }",
            1,
        )?;
        let header = header.into_iter().next().unwrap_or_default();

        let imports = graph
            .select(
                key,
                &format!(
                    "SELECT DISTINCT ?i WHERE {{ ?o owl:imports ?i }} ORDER BY ?i LIMIT {MAX_IMPORTS}"
                ),
                MAX_IMPORTS,
            )?
            .into_iter()
            .filter_map(|mut row| row.remove("i"))
            .collect();

        Ok(Self {
            ontology_iri: header.get("o").cloned(),
            title: header.get("title").cloned(),
            description: header.get("desc").cloned(),
            triples: stats.triples,
            classes: stats.classes,
            properties: stats.properties,
            namespaces: stats.namespaces,
            imports,
            label_predicates: predicates_in_use(graph, key, LABEL_PREDICATES)?,
            description_predicates: predicates_in_use(graph, key, DESCRIPTION_PREDICATES)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.triples == 0
            && self.namespaces.is_empty()
            && self.imports.is_empty()
    }
}

fn predicates_in_use(
    graph: &GraphAdapter,
    key: &str,
    candidates: &[&str],
) -> GraphResult<Vec<String>> {
    let values = candidates
        .iter()
        .map(|iri| format!("<{iri}>"))
        .collect::<Vec<_>>()
        .join(" ");
    let sparql = format!(
        "SELECT ?p (COUNT(*) AS ?n) WHERE {{ ?s ?p ?o VALUES ?p {{ {values} }} }} GROUP BY ?p ORDER BY DESC(?n)"
    );
    Ok(graph
        .select(key, &sparql, candidates.len())?
        .into_iter()
        .filter_map(|mut row| row.remove("p"))
        .collect())
}

/// Render the card into at most `budget` characters.
pub fn pack(card: &SenseCard, budget: usize) -> String {
    if card.is_empty() {
        return String::new();
    }
    let mut out = LineBudget::new(budget);

    let title = card
        .title
        .clone()
        .or_else(|| card.ontology_iri.clone())
        .unwrap_or_else(|| "untitled ontology".to_string());
    let mut lines = vec![format!("Ontology: {title}")];
    if let Some(desc) = &card.description {
        let desc = desc.split_whitespace().collect::<Vec<_>>().join(" ");
        lines.push(format!("Description: {desc}"));
    }
    lines.push(format!(
        "Size: {} triples, {} classes, {} properties",
        card.triples, card.classes, card.properties
    ));
    let distinct_iri = card
        .ontology_iri
        .as_ref()
        .filter(|iri| Some(*iri) != card.title.as_ref());
    if let Some(iri) = distinct_iri {
        lines.push(format!("IRI: {iri}"));
    }
    if !card.namespaces.is_empty() {
        lines.push(format!("Namespaces: {}", card.namespaces.join(", ")));
    }
    if !card.imports.is_empty() {
        lines.push(format!("Imports: {}", card.imports.join(", ")));
    }
    if !card.label_predicates.is_empty() {
        lines.push(format!("Labels via: {}", short_list(&card.label_predicates)));
    }
    if !card.description_predicates.is_empty() {
        lines.push(format!(
            "Descriptions via: {}",
            short_list(&card.description_predicates)
        ));
    }

    for line in &lines {
        if !out.push(line) {
            break;
        }
    }
    out.finish()
}

fn short_list(iris: &[String]) -> String {
    iris.iter()
        .map(|iri| local_name(iri).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prov_card() -> SenseCard {
        SenseCard {
            ontology_iri: Some("http://www.w3.org/ns/prov-o#".into()),
            title: Some("W3C PROVenance Interchange Ontology (PROV-O)".into()),
            description: Some(
                "This document is published by the Provenance Working Group.".into(),
            ),
            triples: 1664,
            classes: 39,
            properties: 58,
            namespaces: vec![
                "http://www.w3.org/ns/prov#".into(),
                "http://www.w3.org/2002/07/owl#".into(),
            ],
            imports: vec![],
            label_predicates: vec!["http://www.w3.org/2000/01/rdf-schema#label".into()],
            description_predicates: vec!["http://www.w3.org/2000/01/rdf-schema#comment".into()],
        }
    }

    #[test]
    fn test_full_card_renders_all_sections() {
        let text = pack(&prov_card(), 2000);
        assert!(text.starts_with("Ontology: W3C PROVenance"));
        assert!(text.contains("Size: 1664 triples, 39 classes, 58 properties"));
        assert!(text.contains("Namespaces: http://www.w3.org/ns/prov#"));
        assert!(text.contains("Labels via: label"));
        assert!(text.contains("Descriptions via: comment"));
    }

    #[test]
    fn test_truncation_keeps_title_before_stats() {
        let full = pack(&prov_card(), 2000);
        let title_line = full.lines().next().unwrap().chars().count();
        let text = pack(&prov_card(), title_line + 5);
        assert!(text.starts_with("Ontology:"));
        assert!(!text.contains("Size:"));
    }

    #[test]
    fn test_description_outranks_iri_under_tight_budget() {
        let card = SenseCard {
            ontology_iri: Some("http://example.org/a/long/ontology/iri/for/provenance#".into()),
            title: Some("PROV-O".into()),
            description: Some("Provenance vocabulary.".into()),
            triples: 10,
            ..SenseCard::default()
        };
        let budget = "Ontology: PROV-O\nDescription: Provenance vocabulary.".len() + 5;
        let text = pack(&card, budget);
        assert!(text.contains("Description: Provenance vocabulary."));
        assert!(!text.contains("IRI:"));
        assert!(pack(&card, 2000).contains("IRI: http://example.org/"));
    }

    #[test]
    fn test_budget_invariant() {
        let card = prov_card();
        for budget in [0, 1, 10, 50, 120, 200, 400, 5000] {
            assert!(pack(&card, budget).chars().count() <= budget);
        }
    }

    #[test]
    fn test_empty_card_packs_empty() {
        assert_eq!(pack(&SenseCard::default(), 500), "");
    }
}
