use std::fmt;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// --- Taxonomy ---

/// Level of a node in the food taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Category,
    GenericFood,
    BrandedProduct,
}

pub const NODE_KINDS: &[&str] = &["category", "generic_food", "branded_product"];

impl NodeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::GenericFood => "generic_food",
            Self::BrandedProduct => "branded_product",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "category" => Ok(Self::Category),
            "generic_food" | "generic" | "food" => Ok(Self::GenericFood),
            "branded_product" | "branded" | "product" => Ok(Self::BrandedProduct),
            _ => bail!(
                "Invalid taxonomy kind '{s}'. Must be one of: {}",
                NODE_KINDS.join(", ")
            ),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyNode {
    pub id: i64,
    pub name: String,
    pub kind: NodeKind,
    /// Back-reference only; the path is the source of truth for ancestry.
    pub parent_id: Option<i64>,
    /// Materialized root-to-node id sequence, e.g. `/1/2/3/`.
    pub path: String,
    pub is_pantry_staple: bool,
}

impl TaxonomyNode {
    /// Number of levels below the root (a root node has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.path.matches('/').count().saturating_sub(2)
    }
}

#[derive(Debug, Clone)]
pub struct NewTaxonomyNode {
    pub name: String,
    pub kind: NodeKind,
    pub parent_id: Option<i64>,
    pub is_pantry_staple: bool,
}

/// Build the materialized path for `id` under a parent path (or as a root).
#[must_use]
pub fn child_path(parent_path: Option<&str>, id: i64) -> String {
    match parent_path {
        Some(parent) => format!("{parent}{id}/"),
        None => format!("/{id}/"),
    }
}

// --- Users, households and scope ---

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub household_id: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Household {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Whose inventory a request reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Scope {
    User(i64),
    Household(i64),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Household(id) => write!(f, "household:{id}"),
        }
    }
}

// --- Inventory ---

#[derive(Debug, Clone, Serialize)]
pub struct InventoryRecord {
    pub id: i64,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub household_id: Option<i64>,
    pub taxonomy_id: i64,
    pub quantity: f64,
    pub unit: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
    // Joined for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewInventoryRecord {
    pub user_id: i64,
    pub taxonomy_id: i64,
    pub quantity: f64,
    pub unit: String,
    pub location: String,
    pub expires_at: Option<NaiveDate>,
}

pub const STORAGE_LOCATIONS: &[&str] = &["pantry", "fridge", "freezer", "other"];

pub fn validate_location(location: &str) -> Result<String> {
    let lower = location.trim().to_lowercase();
    if STORAGE_LOCATIONS.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        bail!(
            "Invalid storage location '{location}'. Must be one of: {}",
            STORAGE_LOCATIONS.join(", ")
        )
    }
}

pub fn validate_quantity(quantity: f64) -> Result<()> {
    if !quantity.is_finite() || quantity < 0.0 {
        bail!("Quantity must be a non-negative number (got {quantity})");
    }
    Ok(())
}

// --- Substitutions ---

/// Quality of a substitution. Variant order is quality order: `Exact` is best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Generic,
    Close,
    Exact,
}

pub const MATCH_TYPES: &[&str] = &["exact", "close", "generic"];

impl MatchType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Close => "close",
            Self::Generic => "generic",
        }
    }

    /// Weight a substitution of this quality contributes to coverage.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Self::Exact => 1.0,
            Self::Close => 0.75,
            Self::Generic => 0.5,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "close" => Ok(Self::Close),
            "generic" => Ok(Self::Generic),
            _ => bail!(
                "Invalid match type '{s}'. Must be one of: {}",
                MATCH_TYPES.join(", ")
            ),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owning `substitute_id` satisfies a recipe line that calls for `required_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstitutionEdge {
    pub required_id: i64,
    pub substitute_id: i64,
    pub match_type: MatchType,
}

// --- Recipes ---

#[derive(Debug, Clone, Serialize)]
pub struct RecipeSummary {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuisine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prep_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cook_minutes: Option<i64>,
    pub servings: f64,
    pub is_public: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewRecipe {
    pub title: String,
    pub cuisine: Option<String>,
    pub difficulty: Option<String>,
    pub prep_minutes: Option<i64>,
    pub cook_minutes: Option<i64>,
    pub servings: f64,
    pub is_public: bool,
}

pub fn validate_new_recipe(recipe: &NewRecipe) -> Result<()> {
    if recipe.title.trim().is_empty() {
        bail!("Recipe title must not be empty");
    }
    if !recipe.servings.is_finite() || recipe.servings <= 0.0 {
        bail!("Recipe servings must be greater than 0");
    }
    if recipe.prep_minutes.is_some_and(|m| m < 0) || recipe.cook_minutes.is_some_and(|m| m < 0) {
        bail!("Recipe timings must not be negative");
    }
    Ok(())
}

/// One line of a recipe's ingredient list.
#[derive(Debug, Clone, Serialize)]
pub struct IngredientLine {
    pub id: i64,
    pub recipe_id: i64,
    pub position: i64,
    /// `None` for free-text lines that are not linked to the taxonomy.
    pub taxonomy_id: Option<i64>,
    pub display_name: String,
    /// `None` when the stored quantity is missing or malformed.
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub is_optional: bool,
}

#[derive(Debug, Clone)]
pub struct NewIngredientLine {
    pub taxonomy_id: Option<i64>,
    pub display_name: String,
    pub quantity: Option<f64>,
    pub unit: Option<String>,
    pub is_optional: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: RecipeSummary,
    pub ingredients: Vec<IngredientLine>,
}

// --- Queries ---

/// Catalogue filters applied when fetching candidate recipes. Absent filters are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeFilters {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
}

impl RecipeFilters {
    /// Drop blank filter values so they behave as omitted.
    #[must_use]
    pub fn normalized(&self) -> Self {
        fn clean(v: Option<&String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            query: clean(self.query.as_ref()),
            cuisine: clean(self.cuisine.as_ref()),
            difficulty: clean(self.difficulty.as_ref()),
        }
    }
}

pub const DEFAULT_MAX_MISSING: usize = 5;

/// Options for a smart search. `None` falls back to the persisted defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub max_missing: Option<usize>,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub assume_pantry_staples: Option<bool>,
}

impl SearchOptions {
    #[must_use]
    pub fn filters(&self) -> RecipeFilters {
        RecipeFilters {
            query: self.query.clone(),
            cuisine: self.cuisine.clone(),
            difficulty: self.difficulty.clone(),
        }
        .normalized()
    }
}

/// Fallbacks for options a search request leaves out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SearchDefaults {
    pub max_missing: usize,
    pub assume_pantry_staples: bool,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            max_missing: DEFAULT_MAX_MISSING,
            assume_pantry_staples: true,
        }
    }
}

// --- Settings ---

pub const SETTING_DEFAULT_MAX_MISSING: &str = "default_max_missing";
pub const SETTING_ASSUME_STAPLES: &str = "assume_pantry_staples";
pub const SETTING_KEYS: &[&str] = &[SETTING_DEFAULT_MAX_MISSING, SETTING_ASSUME_STAPLES];

/// Validate a settings value, returning its canonical string form.
pub fn validate_setting(key: &str, value: &str) -> Result<String> {
    match key {
        SETTING_DEFAULT_MAX_MISSING => {
            let n: usize = value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{key} must be a non-negative integer"))?;
            Ok(n.to_string())
        }
        SETTING_ASSUME_STAPLES => match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok("true".to_string()),
            "false" | "no" | "off" | "0" => Ok("false".to_string()),
            _ => bail!("{key} must be true or false"),
        },
        _ => bail!(
            "Unknown setting '{key}'. Must be one of: {}",
            SETTING_KEYS.join(", ")
        ),
    }
}
