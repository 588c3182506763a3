use std::collections::{HashMap, HashSet};

use crate::models::{MatchType, SubstitutionEdge};

/// Best available substitution per required ingredient, built fresh for each request
/// from the edges whose substitute the caller currently owns.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionGraph {
    best: HashMap<i64, MatchType>,
}

impl SubstitutionGraph {
    /// Keep only edges whose `substitute_id` is owned; on conflicts keep the
    /// highest-quality match type.
    #[must_use]
    pub fn from_edges(edges: &[SubstitutionEdge], owned: &HashSet<i64>) -> Self {
        let mut best: HashMap<i64, MatchType> = HashMap::new();
        for edge in edges.iter().filter(|e| owned.contains(&e.substitute_id)) {
            best.entry(edge.required_id)
                .and_modify(|m| *m = (*m).max(edge.match_type))
                .or_insert(edge.match_type);
        }
        Self { best }
    }

    #[must_use]
    pub fn best_match(&self, required_id: i64) -> Option<MatchType> {
        self.best.get(&required_id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.best.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.best.is_empty()
    }
}
