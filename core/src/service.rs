use std::collections::{HashMap, HashSet};

use anyhow::Result;
use tracing::{debug, info};

use crate::coverage::{CoverageResult, CoverageScorer};
use crate::deduction::{CookError, CookReport, DeductionPlan};
use crate::inventory::{InventorySnapshot, StapleSet};
use crate::models::{RecipeFilters, RecipeSummary, Scope, SearchDefaults, SearchOptions};
use crate::ranking::{self, CoverageStats, RecipeMatch};
use crate::store::PantryStore;
use crate::substitution::SubstitutionGraph;
use crate::taxonomy::TaxonomyStore;

/// The matching engine's exposed operations, run against any [`PantryStore`].
///
/// Inventory, staples and substitutions are re-read on every call; nothing is
/// cached between requests, so a change to the pantry shows up in the very next
/// search.
pub struct PantryService<'a, S: PantryStore + ?Sized> {
    store: &'a S,
    defaults: SearchDefaults,
}

impl<'a, S: PantryStore + ?Sized> PantryService<'a, S> {
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            defaults: SearchDefaults::default(),
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: SearchDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    // --- Smart search ---

    /// Score every public recipe matching the filters, drop those missing more
    /// than `max_missing` lines and order the rest by coverage.
    pub fn smart_search(&self, user_id: i64, options: &SearchOptions) -> Result<Vec<RecipeMatch>> {
        let scope = self.store.resolve_scope(user_id)?;
        let filters = options.filters();
        let max_missing = options.max_missing.unwrap_or(self.defaults.max_missing);
        let assume_staples = options
            .assume_pantry_staples
            .unwrap_or(self.defaults.assume_pantry_staples);

        let candidates = self.store.fetch_candidate_recipes(&filters)?;
        let candidate_count = candidates.len();
        let scored = self.score_recipes(scope, candidates, assume_staples)?;
        let matches = ranking::rank(scored, &filters, max_missing);

        info!(
            user_id,
            %scope,
            candidates = candidate_count,
            returned = matches.len(),
            max_missing,
            assume_staples,
            "smart search"
        );
        Ok(matches)
    }

    /// Bucket the whole public catalogue by coverage, ignoring filters and the
    /// missing-line cutoff.
    pub fn coverage_stats(&self, user_id: i64) -> Result<CoverageStats> {
        let scope = self.store.resolve_scope(user_id)?;
        let candidates = self
            .store
            .fetch_candidate_recipes(&RecipeFilters::default())?;
        let results: Vec<CoverageResult> = self
            .score_recipes(scope, candidates, self.defaults.assume_pantry_staples)?
            .into_iter()
            .map(|(_, coverage)| coverage)
            .collect();
        let stats = ranking::coverage_stats(&results);
        info!(
            user_id,
            %scope,
            total = stats.total,
            fully_matched = stats.fully_matched,
            almost_there = stats.almost_there,
            needs_shopping = stats.needs_shopping,
            "coverage stats"
        );
        Ok(stats)
    }

    /// Coverage breakdown for a single recipe, public or not.
    pub fn recipe_coverage(
        &self,
        user_id: i64,
        recipe_id: i64,
        assume_pantry_staples: Option<bool>,
    ) -> Result<Option<RecipeMatch>> {
        let Some(recipe) = self.store.fetch_recipe(recipe_id)? else {
            return Ok(None);
        };
        let scope = self.store.resolve_scope(user_id)?;
        let assume_staples =
            assume_pantry_staples.unwrap_or(self.defaults.assume_pantry_staples);
        let scored = self.score_recipes(scope, vec![recipe], assume_staples)?;
        Ok(scored
            .into_iter()
            .next()
            .map(|(recipe, coverage)| RecipeMatch::new(recipe, coverage)))
    }

    fn score_recipes(
        &self,
        scope: Scope,
        recipes: Vec<RecipeSummary>,
        assume_staples: bool,
    ) -> Result<Vec<(RecipeSummary, CoverageResult)>> {
        if recipes.is_empty() {
            return Ok(Vec::new());
        }

        let owned = self.store.fetch_inventory_ids(&scope)?;
        let staples = if assume_staples {
            StapleSet::new(self.store.fetch_staple_ids()?)
        } else {
            StapleSet::disabled()
        };
        let edges = self.store.fetch_substitution_edges(&owned)?;
        let substitutions = SubstitutionGraph::from_edges(&edges, &owned);

        let recipe_ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
        let mut lines = ranking::group_lines(self.store.fetch_ingredient_lines(&recipe_ids)?);

        // Only the nodes this request touches: owned ones and the ones recipes ask for.
        let mut node_ids: HashSet<i64> = owned.clone();
        node_ids.extend(lines.values().flatten().filter_map(|l| l.taxonomy_id));
        let node_ids: Vec<i64> = node_ids.into_iter().collect();
        let taxonomy = TaxonomyStore::new(self.store.fetch_taxonomy_nodes(&node_ids)?);

        debug!(
            %scope,
            owned = owned.len(),
            staples = staples.len(),
            substitutes = substitutions.len(),
            nodes = taxonomy.len(),
            "loaded match context"
        );

        let inventory = InventorySnapshot::new(scope, owned);
        let scorer = CoverageScorer::new(&inventory, &staples, &substitutions, &taxonomy);
        Ok(recipes
            .into_iter()
            .map(|recipe| {
                let recipe_lines = lines.remove(&recipe.id).unwrap_or_default();
                let coverage = scorer.score(recipe.id, &recipe_lines);
                (recipe, coverage)
            })
            .collect())
    }

    // --- Mark cooked ---

    /// Deduct a cooked recipe's ingredients from inventory, soonest-expiring stock
    /// first. Every deduction of the cook event is written, or none is.
    pub fn mark_cooked(
        &self,
        user_id: i64,
        recipe_id: i64,
        servings: f64,
    ) -> Result<CookReport, CookError> {
        if !servings.is_finite() || servings <= 0.0 {
            return Err(CookError::InvalidServings(servings));
        }
        self.store
            .fetch_recipe(recipe_id)
            .map_err(CookError::inventory)?
            .ok_or(CookError::RecipeNotFound(recipe_id))?;

        let scope = self
            .store
            .resolve_scope(user_id)
            .map_err(CookError::inventory)?;
        let lines = self
            .store
            .fetch_ingredient_lines(&[recipe_id])
            .map_err(CookError::inventory)?;

        let mut records_by_node = HashMap::new();
        let mut plan = DeductionPlan::new();
        for line in &lines {
            let Some(taxonomy_id) = line.taxonomy_id else {
                continue;
            };
            if !records_by_node.contains_key(&taxonomy_id) {
                let records = self
                    .store
                    .fetch_inventory_records_by_expiration(&scope, taxonomy_id)
                    .map_err(CookError::inventory)?;
                records_by_node.insert(taxonomy_id, records);
            }
            let records = records_by_node
                .get(&taxonomy_id)
                .map_or(&[][..], Vec::as_slice);
            plan.deduct_line(line, servings, records);
        }

        if !plan.updates().is_empty() {
            self.store
                .persist_deduction(plan.updates())
                .map_err(CookError::inventory)?;
        }

        let report = plan.into_report(recipe_id, servings);
        info!(
            user_id,
            %scope,
            recipe_id,
            servings,
            records_updated = report.updates.len(),
            "recipe marked as cooked"
        );
        Ok(report)
    }
}
