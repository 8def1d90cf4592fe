//! L1 schema constraints and the query anti-patterns derived from them.
//!
//! Truncation priority: anti-patterns, disjoint pairs, property
//! characteristics, domain/range, cardinality.

use serde::{Deserialize, Serialize};

use super::LineBudget;
use crate::graph::{local_name, GraphAdapter, GraphResult};

const MAX_ROWS: usize = 200;

/// OWL property characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Characteristic {
    Functional,
    InverseFunctional,
    Symmetric,
    Transitive,
}

impl Characteristic {
    fn from_iri(iri: &str) -> Option<Self> {
        match local_name(iri) {
            "FunctionalProperty" => Some(Self::Functional),
            "InverseFunctionalProperty" => Some(Self::InverseFunctional),
            "SymmetricProperty" => Some(Self::Symmetric),
            "TransitiveProperty" => Some(Self::Transitive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Functional => "functional",
            Self::InverseFunctional => "inverse-functional",
            Self::Symmetric => "symmetric",
            Self::Transitive => "transitive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRange {
    pub property: String,
    pub domain: Option<String>,
    pub range: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyCharacteristic {
    pub property: String,
    pub characteristic: Characteristic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityRestriction {
    pub class: String,
    pub property: String,
    /// `cardinality`, `minCardinality`, `maxQualifiedCardinality`, ...
    pub kind: String,
    pub value: String,
}

/// Schema-level constraints extracted from a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConstraints {
    pub domain_range: Vec<DomainRange>,
    pub disjoint: Vec<(String, String)>,
    pub characteristics: Vec<PropertyCharacteristic>,
    pub cardinality: Vec<CardinalityRestriction>,
}

impl SchemaConstraints {
    /// Extract constraints from a loaded graph.
    pub fn from_graph(graph: &GraphAdapter, key: &str) -> GraphResult<Self> {
        let domain_range = graph
            .select(
                key,
                "SELECT DISTINCT ?p ?d ?r WHERE { \
                   { ?p rdfs:domain ?d OPTIONAL { ?p rdfs:range ?r } } \
                   UNION \
                   { ?p rdfs:range ?r FILTER NOT EXISTS { ?p rdfs:domain ?any } } \
                   FILTER(isIRI(?p)) } ORDER BY ?p",
                MAX_ROWS,
            )?
            .into_iter()
            .filter_map(|mut row| {
                Some(DomainRange {
                    property: row.remove("p")?,
                    domain: row.remove("d"),
                    range: row.remove("r"),
                })
            })
            .collect();

        let disjoint = graph
            .select(
                key,
                "SELECT DISTINCT ?a ?b WHERE { ?a owl:disjointWith ?b FILTER(isIRI(?a) && isIRI(?b)) } ORDER BY ?a ?b",
                MAX_ROWS,
            )?
            .into_iter()
            .filter_map(|mut row| Some((row.remove("a")?, row.remove("b")?)))
            .collect();

        let characteristics = graph
            .select(
                key,
                "SELECT DISTINCT ?p ?t WHERE { ?p a ?t VALUES ?t { owl:FunctionalProperty \
                 owl:InverseFunctionalProperty owl:SymmetricProperty owl:TransitiveProperty } } \
                 ORDER BY ?p ?t",
                MAX_ROWS,
            )?
            .into_iter()
            .filter_map(|mut row| {
                Some(PropertyCharacteristic {
                    property: row.remove("p")?,
                    characteristic: Characteristic::from_iri(&row.remove("t")?)?,
                })
            })
            .collect();

        let cardinality = graph
            .select(
                key,
                "SELECT DISTINCT ?c ?p ?k ?n WHERE { ?c rdfs:subClassOf ?r . \
                 ?r a owl:Restriction ; owl:onProperty ?p ; ?k ?n . \
                 VALUES ?k { owl:cardinality owl:minCardinality owl:maxCardinality \
                 owl:qualifiedCardinality owl:minQualifiedCardinality owl:maxQualifiedCardinality } \
                 FILTER(isIRI(?c)) } ORDER BY ?c ?p",
                MAX_ROWS,
            )?
            .into_iter()
            .filter_map(|mut row| {
                Some(CardinalityRestriction {
                    class: row.remove("c")?,
                    property: row.remove("p")?,
                    kind: local_name(&row.remove("k")?).to_string(),
                    value: row.remove("n")?,
                })
            })
            .collect();

        Ok(Self {
            domain_range,
            disjoint,
            characteristics,
            cardinality,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.domain_range.is_empty()
            && self.disjoint.is_empty()
            && self.characteristics.is_empty()
            && self.cardinality.is_empty()
    }

    /// Natural-language query anti-patterns implied by the constraints.
    pub fn anti_patterns(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (a, b) in &self.disjoint {
            out.push(format!(
                "Do not require one resource to be both {} and {}: the classes are disjoint.",
                local_name(a),
                local_name(b)
            ));
        }
        for pc in &self.characteristics {
            let p = local_name(&pc.property);
            match pc.characteristic {
                Characteristic::Functional => out.push(format!(
                    "Do not expect several values of {p} per subject: it is functional."
                )),
                Characteristic::InverseFunctional => out.push(format!(
                    "Do not expect several subjects sharing one {p} value: it is inverse-functional."
                )),
                Characteristic::Symmetric => out.push(format!(
                    "Do not query {p} in both directions: it is symmetric."
                )),
                Characteristic::Transitive => out.push(format!(
                    "Do not hand-roll chains of {p}: it is transitive, use a property path ({p}+)."
                )),
            }
        }
        for dr in &self.domain_range {
            if let Some(domain) = &dr.domain {
                out.push(format!(
                    "Do not use {} on subjects outside {}.",
                    local_name(&dr.property),
                    local_name(domain)
                ));
            }
        }
        out
    }
}

/// Render constraints into at most `budget` characters.
pub fn pack(constraints: &SchemaConstraints, budget: usize) -> String {
    if constraints.is_empty() {
        return String::new();
    }
    let mut lines: Vec<String> = Vec::new();

    let anti = constraints.anti_patterns();
    if !anti.is_empty() {
        lines.push("Anti-patterns:".to_string());
        lines.extend(anti.into_iter().map(|a| format!("- {a}")));
    }
    if !constraints.disjoint.is_empty() {
        lines.push("Disjoint classes:".to_string());
        lines.extend(
            constraints
                .disjoint
                .iter()
                .map(|(a, b)| format!("- {} / {}", local_name(a), local_name(b))),
        );
    }
    if !constraints.characteristics.is_empty() {
        lines.push("Property characteristics:".to_string());
        lines.extend(constraints.characteristics.iter().map(|pc| {
            format!("- {}: {}", local_name(&pc.property), pc.characteristic.as_str())
        }));
    }
    if !constraints.domain_range.is_empty() {
        lines.push("Domain / range:".to_string());
        lines.extend(constraints.domain_range.iter().map(|dr| {
            format!(
                "- {}: {} -> {}",
                local_name(&dr.property),
                dr.domain.as_deref().map(local_name).unwrap_or("?"),
                dr.range.as_deref().map(local_name).unwrap_or("?"),
            )
        }));
    }
    if !constraints.cardinality.is_empty() {
        lines.push("Cardinality:".to_string());
        lines.extend(constraints.cardinality.iter().map(|c| {
            format!(
                "- {} {} {} {}",
                local_name(&c.class),
                local_name(&c.property),
                c.kind,
                c.value
            )
        }));
    }

    let mut out = LineBudget::new(budget);
    for line in &lines {
        if !out.push(line) {
            break;
        }
    }
    out.finish()
}
