//! Per-recipe ingredient coverage.
//!
//! Each ingredient line is classified by the first rule that applies:
//!
//! 1. the exact node is owned, is a pantry staple, or the line is optional (weight 1.0)
//! 2. an owned node sits below the required node in the taxonomy (weight 0.9)
//! 3. an owned node is a registered substitute (1.0 / 0.75 / 0.5 by match type)
//! 4. otherwise the line is missing (weight 0)
//!
//! Classification short-circuits, so an owned ingredient is never reported
//! as a substitution.

use serde::Serialize;
use tracing::debug;

use crate::inventory::{InventorySnapshot, StapleSet};
use crate::models::{IngredientLine, MatchType};
use crate::substitution::SubstitutionGraph;
use crate::taxonomy::TaxonomyStore;

pub const TAXONOMY_MATCH_WEIGHT: f64 = 0.9;

/// How a single ingredient line was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineMatch {
    Exact,
    Staple,
    Optional,
    Taxonomy,
    Substitution { match_type: MatchType },
    Missing,
}

impl LineMatch {
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Self::Exact | Self::Staple | Self::Optional => 1.0,
            Self::Taxonomy => TAXONOMY_MATCH_WEIGHT,
            Self::Substitution { match_type } => match_type.weight(),
            Self::Missing => 0.0,
        }
    }

    #[must_use]
    pub fn is_owned(self) -> bool {
        self.weight() > 0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LineOutcome {
    pub line_id: i64,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taxonomy_id: Option<i64>,
    #[serde(rename = "match")]
    pub matched: LineMatch,
    pub weight: f64,
}

/// Coverage of one recipe by one inventory snapshot. Derived per request, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageResult {
    pub recipe_id: i64,
    pub total_ingredients: usize,
    /// Lines with any positive weight, for "X of Y ingredients" display.
    pub owned_ingredients: usize,
    pub weighted_sum: f64,
    pub coverage_percentage: u32,
    /// Display names of unmatched lines, in recipe order.
    pub missing_ingredient_names: Vec<String>,
    pub lines: Vec<LineOutcome>,
}

impl CoverageResult {
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.total_ingredients - self.owned_ingredients
    }
}

/// Scores recipes against collections that were fetched once for the request.
pub struct CoverageScorer<'a> {
    inventory: &'a InventorySnapshot,
    staples: &'a StapleSet,
    substitutions: &'a SubstitutionGraph,
    taxonomy: &'a TaxonomyStore,
    owned_paths: Vec<&'a str>,
}

impl<'a> CoverageScorer<'a> {
    #[must_use]
    pub fn new(
        inventory: &'a InventorySnapshot,
        staples: &'a StapleSet,
        substitutions: &'a SubstitutionGraph,
        taxonomy: &'a TaxonomyStore,
    ) -> Self {
        let owned_paths = inventory
            .ids()
            .iter()
            .filter_map(|id| taxonomy.ancestor_path_of(*id))
            .collect();
        Self {
            inventory,
            staples,
            substitutions,
            taxonomy,
            owned_paths,
        }
    }

    #[must_use]
    pub fn classify(&self, line: &IngredientLine) -> LineMatch {
        let Some(required) = line.taxonomy_id else {
            return if line.is_optional {
                LineMatch::Optional
            } else {
                LineMatch::Missing
            };
        };

        if self.inventory.owns(required) {
            return LineMatch::Exact;
        }
        if self.staples.contains(required) {
            return LineMatch::Staple;
        }
        if line.is_optional {
            return LineMatch::Optional;
        }
        if self.owns_descendant_of(required) {
            return LineMatch::Taxonomy;
        }
        if let Some(match_type) = self.substitutions.best_match(required) {
            return LineMatch::Substitution { match_type };
        }
        LineMatch::Missing
    }

    fn owns_descendant_of(&self, required: i64) -> bool {
        let Some(required_path) = self.taxonomy.ancestor_path_of(required) else {
            return false;
        };
        self.owned_paths
            .iter()
            .any(|owned| owned.starts_with(required_path))
    }

    /// Score one recipe. `lines` must already be in recipe order.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss)]
    pub fn score(&self, recipe_id: i64, lines: &[IngredientLine]) -> CoverageResult {
        let mut outcomes = Vec::with_capacity(lines.len());
        let mut missing = Vec::new();
        let mut weighted_sum = 0.0;
        let mut owned = 0;

        for line in lines {
            let matched = self.classify(line);
            let weight = matched.weight();
            weighted_sum += weight;
            if matched.is_owned() {
                owned += 1;
            } else {
                missing.push(line.display_name.clone());
            }
            outcomes.push(LineOutcome {
                line_id: line.id,
                display_name: line.display_name.clone(),
                taxonomy_id: line.taxonomy_id,
                matched,
                weight,
            });
        }

        let total = lines.len();
        let coverage_percentage = if total == 0 {
            100
        } else {
            (100.0 * weighted_sum / total as f64).round().clamp(0.0, 100.0) as u32
        };

        debug!(
            recipe_id,
            total, owned, weighted_sum, coverage_percentage, "scored recipe"
        );

        CoverageResult {
            recipe_id,
            total_ingredients: total,
            owned_ingredients: owned,
            weighted_sum,
            coverage_percentage,
            missing_ingredient_names: missing,
            lines: outcomes,
        }
    }
}
