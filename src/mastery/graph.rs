//! Static prerequisite graph between concepts.
//!
//! The graph is configuration data: it is loaded once, validated acyclic, and
//! never mutated. Its topological order (prerequisites first, ties by name) is
//! the global concept ordering used for context vectors.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::EngineError;

/// Built-in curriculum graph: concept -> prerequisites.
const DEFAULT_GRAPH: &[(&str, &[&str])] = &[
    ("Functions", &["Variables"]),
    ("Loops", &["Variables"]),
    ("Arrays", &["Variables", "Loops"]),
    ("Objects", &["Variables", "Functions"]),
    ("Async", &["Functions", "Objects"]),
    ("Closures", &["Functions", "Objects"]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptGraph {
    /// Every concept is a key, including those with no prerequisites.
    prerequisites: BTreeMap<String, Vec<String>>,
    order: Vec<String>,
}

impl Default for ConceptGraph {
    fn default() -> Self {
        let map = DEFAULT_GRAPH
            .iter()
            .map(|(concept, prereqs)| {
                (
                    concept.to_string(),
                    prereqs.iter().map(|p| p.to_string()).collect(),
                )
            })
            .collect();
        // The built-in table is acyclic, so the fallible path cannot fail here.
        Self::from_map(map).unwrap_or_else(|_| Self {
            prerequisites: BTreeMap::new(),
            order: Vec::new(),
        })
    }
}

impl ConceptGraph {
    /// Build from a concept -> prerequisites map. Concepts that only appear as
    /// prerequisites become roots. A cycle is a configuration error.
    pub fn from_map(map: BTreeMap<String, Vec<String>>) -> Result<Self, EngineError> {
        let mut prerequisites: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (concept, prereqs) in map {
            let concept = concept.trim().to_string();
            if concept.is_empty() {
                return Err(EngineError::Configuration(
                    "concept graph contains an empty concept name".to_string(),
                ));
            }
            let mut deduped: Vec<String> = Vec::new();
            for p in prereqs {
                let p = p.trim().to_string();
                if p.is_empty() {
                    return Err(EngineError::Configuration(format!(
                        "concept '{}' lists an empty prerequisite",
                        concept
                    )));
                }
                if !deduped.contains(&p) {
                    deduped.push(p);
                }
            }
            for p in &deduped {
                prerequisites.entry(p.clone()).or_default();
            }
            prerequisites.entry(concept).or_default().extend(deduped);
        }
        for prereqs in prerequisites.values_mut() {
            prereqs.sort();
            prereqs.dedup();
        }

        let order = topological_order(&prerequisites)?;
        Ok(Self {
            prerequisites,
            order,
        })
    }

    /// Graph from configuration, or the built-in one when none is configured.
    pub fn from_config(map: Option<&BTreeMap<String, Vec<String>>>) -> Result<Self, EngineError> {
        match map {
            Some(map) => Self::from_map(map.clone()),
            None => Ok(Self::default()),
        }
    }

    pub fn contains(&self, concept: &str) -> bool {
        self.prerequisites.contains_key(concept)
    }

    /// Direct prerequisites of a concept; empty for roots and unknown concepts.
    pub fn prerequisites(&self, concept: &str) -> &[String] {
        self.prerequisites
            .get(concept)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Concepts that list `concept` as a direct prerequisite, by name.
    pub fn dependents(&self, concept: &str) -> Vec<&str> {
        self.prerequisites
            .iter()
            .filter(|(_, prereqs)| prereqs.iter().any(|p| p == concept))
            .map(|(c, _)| c.as_str())
            .collect()
    }

    /// Prerequisites before dependents, ties broken by concept name.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Kahn's algorithm with a sorted ready set, so the order is deterministic.
fn topological_order(prerequisites: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>, EngineError> {
    let mut remaining: BTreeMap<&str, usize> = prerequisites
        .iter()
        .map(|(c, prereqs)| (c.as_str(), prereqs.len()))
        .collect();
    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, &n)| n == 0)
        .map(|(c, _)| *c)
        .collect();

    let mut order = Vec::with_capacity(prerequisites.len());
    while let Some(next) = ready.pop_first() {
        remaining.remove(next);
        order.push(next.to_string());
        for (concept, prereqs) in prerequisites {
            if prereqs.iter().any(|p| p == next) {
                if let Some(count) = remaining.get_mut(concept.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(concept.as_str());
                    }
                }
            }
        }
    }

    if !remaining.is_empty() {
        let stuck: Vec<&str> = remaining.keys().copied().collect();
        return Err(EngineError::Configuration(format!(
            "concept graph has a prerequisite cycle among: {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(graph: &ConceptGraph, concept: &str) -> usize {
        graph.order().iter().position(|c| c == concept).unwrap()
    }

    #[test]
    fn test_default_graph_order() {
        let graph = ConceptGraph::default();
        assert_eq!(
            graph.order(),
            &["Variables", "Functions", "Loops", "Arrays", "Objects", "Async", "Closures"]
        );
    }

    #[test]
    fn test_order_respects_every_edge() {
        let graph = ConceptGraph::default();
        for concept in graph.order() {
            for p in graph.prerequisites(concept) {
                assert!(position(&graph, p) < position(&graph, concept));
            }
        }
    }

    #[test]
    fn test_dependents_and_unknown_concepts() {
        let graph = ConceptGraph::default();
        assert_eq!(graph.dependents("Objects"), vec!["Async", "Closures"]);
        assert!(graph.prerequisites("Recursion").is_empty());
        assert!(!graph.contains("Recursion"));
        assert!(graph.contains("Variables"));
    }

    #[test]
    fn test_cycle_is_configuration_error() {
        let mut map = BTreeMap::new();
        map.insert("A".to_string(), vec!["B".to_string()]);
        map.insert("B".to_string(), vec!["C".to_string()]);
        map.insert("C".to_string(), vec!["A".to_string()]);
        let err = ConceptGraph::from_map(map).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut map = BTreeMap::new();
        map.insert("A".to_string(), vec!["A".to_string()]);
        assert!(ConceptGraph::from_map(map).is_err());
    }

    #[test]
    fn test_prerequisite_only_concepts_become_roots() {
        let mut map = BTreeMap::new();
        map.insert("Recursion".to_string(), vec!["Functions".to_string(), "Functions".to_string()]);
        let graph = ConceptGraph::from_map(map).unwrap();
        assert_eq!(graph.order(), &["Functions", "Recursion"]);
        assert_eq!(graph.prerequisites("Recursion"), &["Functions"]);
    }
}
