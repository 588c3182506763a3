use std::collections::HashMap;

use crate::models::TaxonomyNode;

/// Request-scoped arena of taxonomy nodes keyed by id.
///
/// Ancestry questions are answered from materialized paths: `a` is an
/// ancestor-or-self of `b` exactly when `b.path` starts with `a.path`.
/// Paths always end in `/`, so `/1/2/` never prefixes `/1/23/`.
#[derive(Debug, Default, Clone)]
pub struct TaxonomyStore {
    nodes: HashMap<i64, TaxonomyNode>,
}

impl TaxonomyStore {
    #[must_use]
    pub fn new(nodes: impl IntoIterator<Item = TaxonomyNode>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id, n)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<&TaxonomyNode> {
        self.nodes.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Materialized path of `id`, or `None` for an unknown id.
    #[must_use]
    pub fn ancestor_path_of(&self, id: i64) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.path.as_str())
    }

    /// True when `candidate_id` sits at or below `of_id`. Unknown ids are never related.
    #[must_use]
    pub fn is_descendant_or_self(&self, candidate_id: i64, of_id: i64) -> bool {
        match (
            self.ancestor_path_of(candidate_id),
            self.ancestor_path_of(of_id),
        ) {
            (Some(candidate), Some(of)) => candidate.starts_with(of),
            _ => false,
        }
    }

    /// Ids on the path from the root down to `id`, inclusive. Empty for unknown ids.
    #[must_use]
    pub fn lineage(&self, id: i64) -> Vec<i64> {
        self.ancestor_path_of(id)
            .map(path_ids)
            .unwrap_or_default()
    }
}

/// Parse a materialized path like `/1/2/3/` into `[1, 2, 3]`, skipping junk segments.
#[must_use]
pub fn path_ids(path: &str) -> Vec<i64> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NodeKind;

    fn node(id: i64, name: &str, parent_id: Option<i64>, path: &str) -> TaxonomyNode {
        TaxonomyNode {
            id,
            name: name.to_string(),
            kind: NodeKind::GenericFood,
            parent_id,
            path: path.to_string(),
            is_pantry_staple: false,
        }
    }

    fn pork_tree() -> TaxonomyStore {
        TaxonomyStore::new(vec![
            node(6, "Pork", Some(5), "/1/2/5/6/"),
            node(8, "Cured Pork", Some(6), "/1/2/5/6/8/"),
            node(9, "Bacon", Some(8), "/1/2/5/6/8/9/"),
            node(90, "Oscar Mayer Bacon", Some(9), "/1/2/5/6/8/9/90/"),
            node(60, "Sixty", Some(5), "/1/2/5/60/"),
        ])
    }

    #[test]
    fn test_descendant_or_self() {
        let tax = pork_tree();
        assert!(tax.is_descendant_or_self(90, 9));
        assert!(tax.is_descendant_or_self(90, 6));
        assert!(tax.is_descendant_or_self(9, 9));
    }

    #[test]
    fn test_containment_is_asymmetric() {
        let tax = pork_tree();
        assert!(tax.is_descendant_or_self(90, 6));
        assert!(!tax.is_descendant_or_self(6, 90));
    }

    #[test]
    fn test_sibling_with_shared_digit_prefix_is_unrelated() {
        let tax = pork_tree();
        // "/1/2/5/60/" must not count as under "/1/2/5/6/"
        assert!(!tax.is_descendant_or_self(60, 6));
    }

    #[test]
    fn test_unknown_ids_are_unrelated() {
        let tax = pork_tree();
        assert!(!tax.is_descendant_or_self(999, 6));
        assert!(!tax.is_descendant_or_self(90, 999));
        assert!(tax.ancestor_path_of(999).is_none());
    }

    #[test]
    fn test_lineage() {
        let tax = pork_tree();
        assert_eq!(tax.lineage(90), vec![1, 2, 5, 6, 8, 9, 90]);
        assert!(tax.lineage(12345).is_empty());
    }

    #[test]
    fn test_path_ids_skips_junk() {
        assert_eq!(path_ids("/1/x/3/"), vec![1, 3]);
        assert!(path_ids("").is_empty());
    }
}
