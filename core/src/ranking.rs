use std::collections::HashMap;

use serde::Serialize;

use crate::coverage::{CoverageResult, LineOutcome};
use crate::models::{IngredientLine, RecipeFilters, RecipeSummary};

pub const ALMOST_THERE_THRESHOLD: u32 = 80;

/// One row of a smart search: the recipe plus its coverage breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct RecipeMatch {
    #[serde(flatten)]
    pub recipe: RecipeSummary,
    pub total_ingredients: usize,
    pub owned_ingredients: usize,
    pub coverage_percentage: u32,
    pub missing_ingredients: Vec<String>,
    pub lines: Vec<LineOutcome>,
}

impl RecipeMatch {
    #[must_use]
    pub fn new(recipe: RecipeSummary, coverage: CoverageResult) -> Self {
        Self {
            recipe,
            total_ingredients: coverage.total_ingredients,
            owned_ingredients: coverage.owned_ingredients,
            coverage_percentage: coverage.coverage_percentage,
            missing_ingredients: coverage.missing_ingredient_names,
            lines: coverage.lines,
        }
    }

    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.total_ingredients - self.owned_ingredients
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoverageStats {
    pub total: usize,
    pub fully_matched: usize,
    pub almost_there: usize,
    pub needs_shopping: usize,
}

impl RecipeFilters {
    /// In-memory form of the catalogue filters: title containment, exact cuisine and
    /// difficulty, all case-insensitive. Absent filters match everything.
    #[must_use]
    pub fn matches(&self, recipe: &RecipeSummary) -> bool {
        let filters = self.normalized();
        if let Some(q) = &filters.query {
            if !recipe.title.to_lowercase().contains(&q.to_lowercase()) {
                return false;
            }
        }
        let field_eq = |want: Option<&String>, have: Option<&String>| match want {
            None => true,
            Some(w) => have.is_some_and(|h| h.eq_ignore_ascii_case(w)),
        };
        field_eq(filters.cuisine.as_ref(), recipe.cuisine.as_ref())
            && field_eq(filters.difficulty.as_ref(), recipe.difficulty.as_ref())
    }
}

/// Group bulk-fetched lines by recipe, keeping each recipe's line order.
#[must_use]
pub fn group_lines(lines: Vec<IngredientLine>) -> HashMap<i64, Vec<IngredientLine>> {
    let mut grouped: HashMap<i64, Vec<IngredientLine>> = HashMap::new();
    for line in lines {
        grouped.entry(line.recipe_id).or_default().push(line);
    }
    for group in grouped.values_mut() {
        group.sort_by_key(|l| (l.position, l.id));
    }
    grouped
}

/// Apply filters and the missing-count cutoff, then sort by coverage (descending).
/// Equal coverage is ordered by ascending recipe id so results are deterministic.
#[must_use]
pub fn rank(
    scored: Vec<(RecipeSummary, CoverageResult)>,
    filters: &RecipeFilters,
    max_missing: usize,
) -> Vec<RecipeMatch> {
    let mut matches: Vec<RecipeMatch> = scored
        .into_iter()
        .filter(|(recipe, _)| filters.matches(recipe))
        .filter(|(_, coverage)| coverage.missing_count() <= max_missing)
        .map(|(recipe, coverage)| RecipeMatch::new(recipe, coverage))
        .collect();
    matches.sort_by(|a, b| {
        b.coverage_percentage
            .cmp(&a.coverage_percentage)
            .then(a.recipe.id.cmp(&b.recipe.id))
    });
    matches
}

/// Bucket an unfiltered scoring pass: 100%, [80, 100) and below 80.
#[must_use]
pub fn coverage_stats(results: &[CoverageResult]) -> CoverageStats {
    let mut stats = CoverageStats {
        total: results.len(),
        ..CoverageStats::default()
    };
    for result in results {
        match result.coverage_percentage {
            100.. => stats.fully_matched += 1,
            ALMOST_THERE_THRESHOLD..100 => stats.almost_there += 1,
            _ => stats.needs_shopping += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe(id: i64, title: &str, cuisine: Option<&str>) -> RecipeSummary {
        RecipeSummary {
            id,
            title: title.to_string(),
            cuisine: cuisine.map(String::from),
            difficulty: Some("easy".to_string()),
            prep_minutes: None,
            cook_minutes: None,
            servings: 2.0,
            is_public: true,
            created_at: String::new(),
        }
    }

    fn coverage(recipe_id: i64, total: usize, owned: usize, pct: u32) -> CoverageResult {
        CoverageResult {
            recipe_id,
            total_ingredients: total,
            owned_ingredients: owned,
            weighted_sum: 0.0,
            coverage_percentage: pct,
            missing_ingredient_names: Vec::new(),
            lines: Vec::new(),
        }
    }

    #[test]
    fn test_rank_sorts_by_coverage_then_id() {
        let scored = vec![
            (recipe(3, "C", None), coverage(3, 4, 3, 75)),
            (recipe(1, "A", None), coverage(1, 4, 4, 100)),
            (recipe(2, "B", None), coverage(2, 4, 3, 75)),
        ];
        let ranked = rank(scored, &RecipeFilters::default(), 5);
        let ids: Vec<i64> = ranked.iter().map(|m| m.recipe.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_max_missing_boundary() {
        let scored = vec![
            (recipe(1, "Exactly at limit", None), coverage(1, 7, 5, 71)),
            (recipe(2, "One over", None), coverage(2, 7, 4, 57)),
        ];
        let ranked = rank(scored, &RecipeFilters::default(), 2);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].recipe.id, 1);
    }

    #[test]
    fn test_filters_match() {
        let r = recipe(1, "Spaghetti Carbonara", Some("Italian"));
        let by_text = RecipeFilters {
            query: Some("carbon".to_string()),
            ..RecipeFilters::default()
        };
        assert!(by_text.matches(&r));

        let by_cuisine = RecipeFilters {
            cuisine: Some("italian".to_string()),
            ..RecipeFilters::default()
        };
        assert!(by_cuisine.matches(&r));

        let wrong = RecipeFilters {
            cuisine: Some("Thai".to_string()),
            ..RecipeFilters::default()
        };
        assert!(!wrong.matches(&r));

        let hard = RecipeFilters {
            difficulty: Some("hard".to_string()),
            ..RecipeFilters::default()
        };
        assert!(!hard.matches(&r));
        assert!(!by_cuisine.matches(&recipe(2, "Plain", None)));
    }

    #[test]
    fn test_unknown_filter_value_yields_empty() {
        let scored = vec![(recipe(1, "Tacos", Some("Mexican")), coverage(1, 1, 1, 100))];
        let filters = RecipeFilters {
            cuisine: Some("Martian".to_string()),
            ..RecipeFilters::default()
        };
        assert!(rank(scored, &filters, 5).is_empty());
    }

    #[test]
    fn test_coverage_stats_buckets() {
        let results = vec![
            coverage(1, 1, 1, 100),
            coverage(2, 5, 4, 80),
            coverage(3, 5, 4, 99),
            coverage(4, 5, 3, 79),
            coverage(5, 5, 0, 0),
        ];
        let stats = coverage_stats(&results);
        assert_eq!(
            stats,
            CoverageStats {
                total: 5,
                fully_matched: 1,
                almost_there: 2,
                needs_shopping: 2,
            }
        );
        assert_eq!(
            stats.fully_matched + stats.almost_there + stats.needs_shopping,
            stats.total
        );
    }

    #[test]
    fn test_group_lines_keeps_position_order() {
        let mk = |id, recipe_id, position| IngredientLine {
            id,
            recipe_id,
            position,
            taxonomy_id: None,
            display_name: format!("line {id}"),
            quantity: None,
            unit: None,
            is_optional: false,
        };
        let grouped = group_lines(vec![mk(1, 10, 2), mk(2, 20, 0), mk(3, 10, 1)]);
        let ids: Vec<i64> = grouped[&10].iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(grouped[&20].len(), 1);
    }
}
