use std::collections::HashSet;

use crate::models::Scope;

/// The taxonomy ids a scope owns, captured once per request and never mutated.
#[derive(Debug, Clone)]
pub struct InventorySnapshot {
    scope: Scope,
    owned: HashSet<i64>,
}

impl InventorySnapshot {
    #[must_use]
    pub fn new(scope: Scope, owned: HashSet<i64>) -> Self {
        Self { scope, owned }
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    #[must_use]
    pub fn owns(&self, taxonomy_id: i64) -> bool {
        self.owned.contains(&taxonomy_id)
    }

    #[must_use]
    pub fn ids(&self) -> &HashSet<i64> {
        &self.owned
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }
}

/// Ingredients assumed to always be on hand (salt, pepper, oil...).
#[derive(Debug, Clone, Default)]
pub struct StapleSet {
    ids: HashSet<i64>,
}

impl StapleSet {
    #[must_use]
    pub fn new(ids: HashSet<i64>) -> Self {
        Self { ids }
    }

    /// An empty set, used when the caller turns staple assumption off.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, taxonomy_id: i64) -> bool {
        self.ids.contains(&taxonomy_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_membership() {
        let snap = InventorySnapshot::new(Scope::User(1), HashSet::from([3, 7]));
        assert!(snap.owns(3));
        assert!(!snap.owns(4));
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.scope(), Scope::User(1));
    }

    #[test]
    fn test_disabled_staples_contain_nothing() {
        let staples = StapleSet::disabled();
        assert!(staples.is_empty());
        assert!(!staples.contains(1));
        assert!(StapleSet::new(HashSet::from([1])).contains(1));
    }
}
