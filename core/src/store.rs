use std::collections::HashSet;

use anyhow::Result;

use crate::deduction::DeductionUpdate;
use crate::models::{
    IngredientLine, InventoryRecord, RecipeFilters, RecipeSummary, Scope, SubstitutionEdge,
    TaxonomyNode,
};

/// Bulk reads and the single atomic write the matching engine needs from storage.
///
/// Implementations must not be called per ingredient line by the scorer; every
/// method here is a set-at-a-time fetch.
pub trait PantryStore {
    /// Household scope when the user belongs to one, personal scope otherwise.
    fn resolve_scope(&self, user_id: i64) -> Result<Scope>;

    /// Taxonomy ids referenced by the scope's live (not soft-deleted) inventory records.
    fn fetch_inventory_ids(&self, scope: &Scope) -> Result<HashSet<i64>>;

    fn fetch_staple_ids(&self) -> Result<HashSet<i64>>;

    /// Edges whose `substitute_id` is in `owned`.
    fn fetch_substitution_edges(&self, owned: &HashSet<i64>) -> Result<Vec<SubstitutionEdge>>;

    /// Nodes for the given ids; unknown ids are silently absent.
    fn fetch_taxonomy_nodes(&self, ids: &[i64]) -> Result<Vec<TaxonomyNode>>;

    /// Public, non-deleted recipes matching `filters`.
    fn fetch_candidate_recipes(&self, filters: &RecipeFilters) -> Result<Vec<RecipeSummary>>;

    fn fetch_recipe(&self, recipe_id: i64) -> Result<Option<RecipeSummary>>;

    /// Lines for all given recipes, ordered by recipe then position.
    fn fetch_ingredient_lines(&self, recipe_ids: &[i64]) -> Result<Vec<IngredientLine>>;

    /// Live records for one taxonomy id, soonest expiration first, undated last.
    fn fetch_inventory_records_by_expiration(
        &self,
        scope: &Scope,
        taxonomy_id: i64,
    ) -> Result<Vec<InventoryRecord>>;

    /// Apply every update or none of them.
    fn persist_deduction(&self, updates: &[DeductionUpdate]) -> Result<()>;
}
