use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::warn;

use crate::deduction::DeductionUpdate;
use crate::models::{
    Household, IngredientLine, InventoryRecord, MatchType, NewIngredientLine, NewInventoryRecord,
    NewRecipe, NewTaxonomyNode, NodeKind, RecipeDetail, RecipeFilters, RecipeSummary,
    SETTING_ASSUME_STAPLES, SETTING_DEFAULT_MAX_MISSING, Scope, SearchDefaults, SubstitutionEdge,
    TaxonomyNode, User, child_path, validate_location, validate_new_recipe, validate_quantity,
    validate_setting,
};
use crate::store::PantryStore;

// Keeps IN (...) lists well under SQLite's bound-parameter limit.
const IN_CHUNK: usize = 500;

const NODE_COLUMNS: &str = "id, name, kind, parent_id, path, is_pantry_staple";
const RECIPE_COLUMNS: &str =
    "id, title, cuisine, difficulty, prep_minutes, cook_minutes, servings, is_public, created_at";
const LINE_COLUMNS: &str =
    "id, recipe_id, position, taxonomy_id, display_name, quantity, unit, is_optional";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS taxonomy_nodes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL
                        CHECK (kind IN ('category', 'generic_food', 'branded_product')),
                    parent_id INTEGER REFERENCES taxonomy_nodes(id),
                    path TEXT NOT NULL UNIQUE,
                    is_pantry_staple INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_taxonomy_parent ON taxonomy_nodes(parent_id);
                CREATE INDEX IF NOT EXISTS idx_taxonomy_name ON taxonomy_nodes(name);

                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS households (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS household_members (
                    household_id INTEGER NOT NULL REFERENCES households(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE
                );

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS inventory_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    household_id INTEGER REFERENCES households(id),
                    taxonomy_id INTEGER NOT NULL REFERENCES taxonomy_nodes(id),
                    quantity REAL NOT NULL CHECK (quantity >= 0),
                    unit TEXT NOT NULL,
                    location TEXT NOT NULL DEFAULT 'pantry',
                    expires_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE INDEX IF NOT EXISTS idx_inventory_taxonomy ON inventory_items(taxonomy_id);
                CREATE INDEX IF NOT EXISTS idx_inventory_user ON inventory_items(user_id);
                CREATE INDEX IF NOT EXISTS idx_inventory_household ON inventory_items(household_id);

                CREATE TABLE IF NOT EXISTS substitutions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    required_id INTEGER NOT NULL REFERENCES taxonomy_nodes(id),
                    substitute_id INTEGER NOT NULL REFERENCES taxonomy_nodes(id),
                    match_type TEXT NOT NULL CHECK (match_type IN ('exact', 'close', 'generic')),
                    UNIQUE (required_id, substitute_id)
                );

                CREATE INDEX IF NOT EXISTS idx_substitutions_substitute
                    ON substitutions(substitute_id);

                PRAGMA user_version = 2;",
            )?;
        }

        if version < 3 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    cuisine TEXT,
                    difficulty TEXT,
                    prep_minutes INTEGER,
                    cook_minutes INTEGER,
                    servings REAL NOT NULL DEFAULT 1.0,
                    is_public INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL,
                    deleted_at TEXT
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    position INTEGER NOT NULL,
                    taxonomy_id INTEGER REFERENCES taxonomy_nodes(id),
                    display_name TEXT NOT NULL,
                    quantity REAL,
                    unit TEXT,
                    is_optional INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe
                    ON recipe_ingredients(recipe_id);

                CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 3;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn node_from_row(row: &rusqlite::Row) -> rusqlite::Result<TaxonomyNode> {
        let kind: String = row.get(2)?;
        let kind = NodeKind::parse(&kind)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
        Ok(TaxonomyNode {
            id: row.get(0)?,
            name: row.get(1)?,
            kind,
            parent_id: row.get(3)?,
            path: row.get(4)?,
            is_pantry_staple: row.get(5)?,
        })
    }

    // Expects columns:
    // 0: id, 1: user_id, 2: household_id, 3: taxonomy_id, 4: quantity, 5: unit,
    // 6: location, 7: expires_at, 8: created_at, 9: updated_at, 10: t.name
    fn inventory_from_row(row: &rusqlite::Row) -> rusqlite::Result<InventoryRecord> {
        let expires: Option<String> = row.get(7)?;
        Ok(InventoryRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            household_id: row.get(2)?,
            taxonomy_id: row.get(3)?,
            quantity: row.get(4)?,
            unit: row.get(5)?,
            location: row.get(6)?,
            expires_at: expires.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            food_name: row.get(10)?,
        })
    }

    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<RecipeSummary> {
        Ok(RecipeSummary {
            id: row.get(0)?,
            title: row.get(1)?,
            cuisine: row.get(2)?,
            difficulty: row.get(3)?,
            prep_minutes: row.get(4)?,
            cook_minutes: row.get(5)?,
            servings: row.get(6)?,
            is_public: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn line_from_row(row: &rusqlite::Row) -> rusqlite::Result<IngredientLine> {
        Ok(IngredientLine {
            id: row.get(0)?,
            recipe_id: row.get(1)?,
            position: row.get(2)?,
            taxonomy_id: row.get(3)?,
            display_name: row.get(4)?,
            quantity: decode_quantity(row.get(5)?),
            unit: row.get(6)?,
            is_optional: row.get(7)?,
        })
    }

    fn edge_from_row(row: &rusqlite::Row) -> rusqlite::Result<SubstitutionEdge> {
        let match_type: String = row.get(2)?;
        let match_type = MatchType::parse(&match_type)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;
        Ok(SubstitutionEdge {
            required_id: row.get(0)?,
            substitute_id: row.get(1)?,
            match_type,
        })
    }

    // --- Taxonomy ---

    pub fn add_taxonomy_node(&self, node: &NewTaxonomyNode) -> Result<TaxonomyNode> {
        if node.name.trim().is_empty() {
            bail!("Taxonomy node name must not be empty");
        }
        let parent = match node.parent_id {
            Some(pid) => Some(
                self.get_taxonomy_node(pid)?
                    .with_context(|| format!("Parent taxonomy node {pid} not found"))?,
            ),
            None => None,
        };
        if node.kind == NodeKind::BrandedProduct && parent.is_none() {
            bail!("A branded product must have a parent");
        }
        if parent
            .as_ref()
            .is_some_and(|p| p.kind == NodeKind::BrandedProduct)
        {
            bail!("Branded products cannot have children");
        }

        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        // Path depends on the new id, so it is filled in right after the insert.
        tx.execute(
            "INSERT INTO taxonomy_nodes (name, kind, parent_id, path, is_pantry_staple, created_at)
             VALUES (?1, ?2, ?3, '', ?4, ?5)",
            params![
                node.name.trim(),
                node.kind.as_str(),
                node.parent_id,
                node.is_pantry_staple,
                now
            ],
        )?;
        let id = tx.last_insert_rowid();
        let path = child_path(parent.as_ref().map(|p| p.path.as_str()), id);
        tx.execute(
            "UPDATE taxonomy_nodes SET path = ?1 WHERE id = ?2",
            params![path, id],
        )?;
        tx.commit()?;

        self.get_taxonomy_node(id)?
            .context("Taxonomy node not found after insert")
    }

    pub fn get_taxonomy_node(&self, id: i64) -> Result<Option<TaxonomyNode>> {
        let node = self
            .conn
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM taxonomy_nodes WHERE id = ?1"),
                params![id],
                Self::node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    /// Case-insensitive exact name lookup. With duplicate names the shallowest node wins.
    pub fn find_taxonomy_by_name(&self, name: &str) -> Result<Option<TaxonomyNode>> {
        let node = self
            .conn
            .query_row(
                &format!(
                    "SELECT {NODE_COLUMNS} FROM taxonomy_nodes
                     WHERE LOWER(name) = LOWER(?1)
                     ORDER BY LENGTH(path), id LIMIT 1"
                ),
                params![name.trim()],
                Self::node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    pub fn search_taxonomy(&self, query: &str) -> Result<Vec<TaxonomyNode>> {
        let pattern = like_pattern(query);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM taxonomy_nodes
             WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT 50"
        ))?;
        let nodes = stmt
            .query_map(params![pattern], Self::node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// Direct children of `parent_id`, or the roots when `None`.
    pub fn list_taxonomy_children(&self, parent_id: Option<i64>) -> Result<Vec<TaxonomyNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM taxonomy_nodes
             WHERE parent_id IS ?1 ORDER BY name"
        ))?;
        let nodes = stmt
            .query_map(params![parent_id], Self::node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    /// Every node at or below `id`, in path order.
    pub fn list_taxonomy_subtree(&self, id: i64) -> Result<Vec<TaxonomyNode>> {
        let Some(root) = self.get_taxonomy_node(id)? else {
            return Ok(Vec::new());
        };
        let pattern = format!("{}%", like_escape(&root.path));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM taxonomy_nodes
             WHERE path LIKE ?1 ESCAPE '\\' ORDER BY path"
        ))?;
        let nodes = stmt
            .query_map(params![pattern], Self::node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    pub fn set_pantry_staple(&self, id: i64, is_staple: bool) -> Result<TaxonomyNode> {
        let rows = self.conn.execute(
            "UPDATE taxonomy_nodes SET is_pantry_staple = ?1 WHERE id = ?2",
            params![is_staple, id],
        )?;
        if rows == 0 {
            bail!("Taxonomy node {id} not found");
        }
        self.get_taxonomy_node(id)?
            .context("Taxonomy node not found after update")
    }

    // --- Users and households ---

    pub fn create_user(&self, name: &str) -> Result<User> {
        if name.trim().is_empty() {
            bail!("User name must not be empty");
        }
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO users (name, created_at) VALUES (?1, ?2)",
            params![name.trim(), now],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                "SELECT u.id, u.name, m.household_id, u.created_at
                 FROM users u LEFT JOIN household_members m ON m.user_id = u.id
                 WHERE u.id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        household_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .with_context(|| format!("User {id} not found"))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id, u.name, m.household_id, u.created_at
             FROM users u LEFT JOIN household_members m ON m.user_id = u.id
             ORDER BY u.id",
        )?;
        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    household_id: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn create_household(&self, name: &str) -> Result<Household> {
        if name.trim().is_empty() {
            bail!("Household name must not be empty");
        }
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO households (name, created_at) VALUES (?1, ?2)",
            params![name.trim(), now],
        )?;
        let id = self.conn.last_insert_rowid();
        Ok(Household {
            id,
            name: name.trim().to_string(),
            created_at: now,
        })
    }

    /// Move a user into a household, replacing any previous membership.
    pub fn join_household(&self, user_id: i64, household_id: i64) -> Result<()> {
        self.get_user(user_id)?;
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM households WHERE id = ?1)",
            params![household_id],
            |row| row.get(0),
        )?;
        if !exists {
            bail!("Household {household_id} not found");
        }
        self.conn.execute(
            "INSERT INTO household_members (household_id, user_id) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET household_id = excluded.household_id",
            params![household_id, user_id],
        )?;
        Ok(())
    }

    pub fn leave_household(&self, user_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM household_members WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Inventory ---

    pub fn add_inventory(&self, record: &NewInventoryRecord) -> Result<InventoryRecord> {
        validate_quantity(record.quantity)?;
        let location = validate_location(&record.location)?;
        if self.get_taxonomy_node(record.taxonomy_id)?.is_none() {
            bail!("Taxonomy node {} not found", record.taxonomy_id);
        }
        let household_id = match self.resolve_scope(record.user_id)? {
            Scope::Household(hid) => Some(hid),
            Scope::User(_) => None,
        };
        let now = Local::now().to_rfc3339();
        let expires = record
            .expires_at
            .map(|d| d.format("%Y-%m-%d").to_string());
        self.conn.execute(
            "INSERT INTO inventory_items (user_id, household_id, taxonomy_id, quantity, unit,
                                          location, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.user_id,
                household_id,
                record.taxonomy_id,
                record.quantity,
                record.unit.trim(),
                location,
                expires,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_inventory(id)?
            .context("Inventory record not found after insert")
    }

    pub fn get_inventory(&self, id: i64) -> Result<Option<InventoryRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT i.id, i.user_id, i.household_id, i.taxonomy_id, i.quantity, i.unit,
                        i.location, i.expires_at, i.created_at, i.updated_at, t.name
                 FROM inventory_items i JOIN taxonomy_nodes t ON t.id = i.taxonomy_id
                 WHERE i.id = ?1 AND i.deleted_at IS NULL",
                params![id],
                Self::inventory_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Live records in a scope, soonest expiration first.
    pub fn list_inventory(&self, scope: &Scope) -> Result<Vec<InventoryRecord>> {
        let (clause, scope_id) = scope_clause(scope);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT i.id, i.user_id, i.household_id, i.taxonomy_id, i.quantity, i.unit,
                    i.location, i.expires_at, i.created_at, i.updated_at, t.name
             FROM inventory_items i JOIN taxonomy_nodes t ON t.id = i.taxonomy_id
             WHERE {clause} AND i.deleted_at IS NULL
             ORDER BY i.expires_at IS NULL, i.expires_at, t.name, i.id"
        ))?;
        let records = stmt
            .query_map(params![scope_id], Self::inventory_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Live records expiring on or before `today + days`, including already expired ones.
    pub fn list_expiring(
        &self,
        scope: &Scope,
        today: NaiveDate,
        days: i64,
    ) -> Result<Vec<InventoryRecord>> {
        let cutoff = (today + chrono::Duration::days(days))
            .format("%Y-%m-%d")
            .to_string();
        let (clause, scope_id) = scope_clause(scope);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT i.id, i.user_id, i.household_id, i.taxonomy_id, i.quantity, i.unit,
                    i.location, i.expires_at, i.created_at, i.updated_at, t.name
             FROM inventory_items i JOIN taxonomy_nodes t ON t.id = i.taxonomy_id
             WHERE {clause} AND i.deleted_at IS NULL
               AND i.expires_at IS NOT NULL AND i.expires_at <= ?2
             ORDER BY i.expires_at, i.id"
        ))?;
        let records = stmt
            .query_map(params![scope_id, cutoff], Self::inventory_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn set_inventory_quantity(&self, id: i64, quantity: f64) -> Result<InventoryRecord> {
        validate_quantity(quantity)?;
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE inventory_items SET quantity = ?1, updated_at = ?2
             WHERE id = ?3 AND deleted_at IS NULL",
            params![quantity, now, id],
        )?;
        if rows == 0 {
            bail!("Inventory record {id} not found");
        }
        self.get_inventory(id)?
            .context("Inventory record not found after update")
    }

    /// Soft-delete a record; it stops counting as owned immediately.
    pub fn remove_inventory(&self, id: i64) -> Result<bool> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE inventory_items SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        Ok(rows > 0)
    }

    // --- Substitutions ---

    pub fn add_substitution(
        &self,
        required_id: i64,
        substitute_id: i64,
        match_type: MatchType,
    ) -> Result<SubstitutionEdge> {
        if required_id == substitute_id {
            bail!("An ingredient cannot substitute for itself");
        }
        for id in [required_id, substitute_id] {
            if self.get_taxonomy_node(id)?.is_none() {
                bail!("Taxonomy node {id} not found");
            }
        }
        self.conn.execute(
            "INSERT INTO substitutions (required_id, substitute_id, match_type) VALUES (?1, ?2, ?3)
             ON CONFLICT(required_id, substitute_id)
             DO UPDATE SET match_type = excluded.match_type",
            params![required_id, substitute_id, match_type.as_str()],
        )?;
        Ok(SubstitutionEdge {
            required_id,
            substitute_id,
            match_type,
        })
    }

    pub fn remove_substitution(&self, required_id: i64, substitute_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM substitutions WHERE required_id = ?1 AND substitute_id = ?2",
            params![required_id, substitute_id],
        )?;
        Ok(rows > 0)
    }

    pub fn list_substitutions(&self, required_id: Option<i64>) -> Result<Vec<SubstitutionEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT required_id, substitute_id, match_type FROM substitutions
             WHERE ?1 IS NULL OR required_id = ?1
             ORDER BY required_id, substitute_id",
        )?;
        let edges = stmt
            .query_map(params![required_id], Self::edge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<RecipeSummary> {
        validate_new_recipe(recipe)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (title, cuisine, difficulty, prep_minutes, cook_minutes,
                                  servings, is_public, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                recipe.title.trim(),
                recipe.cuisine,
                recipe.difficulty,
                recipe.prep_minutes,
                recipe.cook_minutes,
                recipe.servings,
                recipe.is_public,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe(id)?.context("Recipe not found after insert")
    }

    /// A non-deleted recipe, public or not.
    pub fn get_recipe(&self, id: i64) -> Result<Option<RecipeSummary>> {
        let recipe = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1 AND deleted_at IS NULL"
                ),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn get_recipe_by_title(&self, title: &str) -> Result<RecipeSummary> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes
                     WHERE LOWER(title) = LOWER(?1) AND deleted_at IS NULL
                     ORDER BY id LIMIT 1"
                ),
                params![title.trim()],
                Self::recipe_from_row,
            )
            .context(format!("Recipe '{title}' not found"))
    }

    pub fn add_ingredient_line(
        &self,
        recipe_id: i64,
        line: &NewIngredientLine,
    ) -> Result<IngredientLine> {
        if self.get_recipe(recipe_id)?.is_none() {
            bail!("Recipe {recipe_id} not found");
        }
        if line.display_name.trim().is_empty() {
            bail!("Ingredient name must not be empty");
        }
        if let Some(q) = line.quantity {
            validate_quantity(q)?;
        }
        if let Some(tid) = line.taxonomy_id {
            if self.get_taxonomy_node(tid)?.is_none() {
                bail!("Taxonomy node {tid} not found");
            }
        }
        let position: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM recipe_ingredients WHERE recipe_id = ?1",
            params![recipe_id],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO recipe_ingredients (recipe_id, position, taxonomy_id, display_name,
                                             quantity, unit, is_optional)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                recipe_id,
                position,
                line.taxonomy_id,
                line.display_name.trim(),
                line.quantity,
                line.unit,
                line.is_optional,
            ],
        )?;
        Ok(IngredientLine {
            id: self.conn.last_insert_rowid(),
            recipe_id,
            position,
            taxonomy_id: line.taxonomy_id,
            display_name: line.display_name.trim().to_string(),
            quantity: line.quantity,
            unit: line.unit.clone(),
            is_optional: line.is_optional,
        })
    }

    pub fn remove_ingredient_line(&self, recipe_id: i64, display_name: &str) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM recipe_ingredients
             WHERE recipe_id = ?1 AND LOWER(display_name) = LOWER(?2)",
            params![recipe_id, display_name.trim()],
        )?;
        Ok(rows > 0)
    }

    pub fn get_recipe_detail(&self, recipe_id: i64) -> Result<RecipeDetail> {
        let recipe = self
            .get_recipe(recipe_id)?
            .with_context(|| format!("Recipe {recipe_id} not found"))?;
        let ingredients = self.fetch_ingredient_lines(&[recipe_id])?;
        Ok(RecipeDetail {
            recipe,
            ingredients,
        })
    }

    pub fn list_recipes(&self, include_private: bool) -> Result<Vec<RecipeSummary>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes
             WHERE deleted_at IS NULL AND (?1 OR is_public = 1)
             ORDER BY id"
        ))?;
        let recipes = stmt
            .query_map(params![include_private], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn set_recipe_public(&self, recipe_id: i64, is_public: bool) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE recipes SET is_public = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![is_public, recipe_id],
        )?;
        if rows == 0 {
            bail!("Recipe {recipe_id} not found");
        }
        Ok(())
    }

    /// Soft-delete: the recipe leaves the search catalogue but its lines are kept.
    pub fn delete_recipe(&self, recipe_id: i64) -> Result<bool> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE recipes SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, recipe_id],
        )?;
        Ok(rows > 0)
    }

    // --- User Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key)
             DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM user_settings WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Persisted search defaults; unset or unreadable values fall back to the built-ins.
    pub fn search_defaults(&self) -> Result<SearchDefaults> {
        let mut defaults = SearchDefaults::default();
        if let Some(v) = self.get_setting(SETTING_DEFAULT_MAX_MISSING)? {
            match v.parse() {
                Ok(n) => defaults.max_missing = n,
                Err(_) => warn!(value = %v, "ignoring invalid default_max_missing setting"),
            }
        }
        if let Some(v) = self.get_setting(SETTING_ASSUME_STAPLES)? {
            defaults.assume_pantry_staples = v == "true";
        }
        Ok(defaults)
    }

    /// Validate and store one of the known settings keys.
    pub fn update_setting(&self, key: &str, value: &str) -> Result<String> {
        let value = validate_setting(key, value)?;
        self.set_setting(key, &value)?;
        Ok(value)
    }

    pub fn delete_setting(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM user_settings WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }
}

impl PantryStore for Database {
    fn resolve_scope(&self, user_id: i64) -> Result<Scope> {
        let household: Option<i64> = self
            .conn
            .query_row(
                "SELECT household_id FROM household_members WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(household.map_or(Scope::User(user_id), Scope::Household))
    }

    fn fetch_inventory_ids(&self, scope: &Scope) -> Result<HashSet<i64>> {
        let (clause, scope_id) = scope_clause(scope);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT i.taxonomy_id FROM inventory_items i
             WHERE {clause} AND i.deleted_at IS NULL"
        ))?;
        let ids = stmt
            .query_map(params![scope_id], |row| row.get(0))?
            .collect::<Result<HashSet<i64>, _>>()?;
        Ok(ids)
    }

    fn fetch_staple_ids(&self) -> Result<HashSet<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM taxonomy_nodes WHERE is_pantry_staple = 1")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<HashSet<i64>, _>>()?;
        Ok(ids)
    }

    fn fetch_substitution_edges(&self, owned: &HashSet<i64>) -> Result<Vec<SubstitutionEdge>> {
        let owned: Vec<i64> = owned.iter().copied().collect();
        let mut edges = Vec::new();
        for chunk in owned.chunks(IN_CHUNK) {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT required_id, substitute_id, match_type FROM substitutions
                 WHERE substitute_id IN ({})",
                placeholders(chunk.len())
            ))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), Self::edge_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            edges.extend(rows);
        }
        Ok(edges)
    }

    fn fetch_taxonomy_nodes(&self, ids: &[i64]) -> Result<Vec<TaxonomyNode>> {
        let mut nodes = Vec::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {NODE_COLUMNS} FROM taxonomy_nodes WHERE id IN ({})",
                placeholders(chunk.len())
            ))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), Self::node_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            nodes.extend(rows);
        }
        Ok(nodes)
    }

    fn fetch_candidate_recipes(&self, filters: &RecipeFilters) -> Result<Vec<RecipeSummary>> {
        let filters = filters.normalized();
        let title_pattern = filters.query.as_deref().map(like_pattern);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes
             WHERE is_public = 1 AND deleted_at IS NULL
               AND (?1 IS NULL OR title LIKE ?1 ESCAPE '\\')
               AND (?2 IS NULL OR cuisine = ?2 COLLATE NOCASE)
               AND (?3 IS NULL OR difficulty = ?3 COLLATE NOCASE)
             ORDER BY id"
        ))?;
        let recipes = stmt
            .query_map(
                params![title_pattern, filters.cuisine, filters.difficulty],
                Self::recipe_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    fn fetch_recipe(&self, recipe_id: i64) -> Result<Option<RecipeSummary>> {
        self.get_recipe(recipe_id)
    }

    fn fetch_ingredient_lines(&self, recipe_ids: &[i64]) -> Result<Vec<IngredientLine>> {
        let mut lines = Vec::new();
        for chunk in recipe_ids.chunks(IN_CHUNK) {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {LINE_COLUMNS} FROM recipe_ingredients
                 WHERE recipe_id IN ({})
                 ORDER BY recipe_id, position, id",
                placeholders(chunk.len())
            ))?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), Self::line_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            lines.extend(rows);
        }
        Ok(lines)
    }

    fn fetch_inventory_records_by_expiration(
        &self,
        scope: &Scope,
        taxonomy_id: i64,
    ) -> Result<Vec<InventoryRecord>> {
        let (clause, scope_id) = scope_clause(scope);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT i.id, i.user_id, i.household_id, i.taxonomy_id, i.quantity, i.unit,
                    i.location, i.expires_at, i.created_at, i.updated_at, t.name
             FROM inventory_items i JOIN taxonomy_nodes t ON t.id = i.taxonomy_id
             WHERE {clause} AND i.taxonomy_id = ?2 AND i.deleted_at IS NULL
             ORDER BY i.expires_at IS NULL, i.expires_at, i.id"
        ))?;
        let records = stmt
            .query_map(params![scope_id, taxonomy_id], Self::inventory_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn persist_deduction(&self, updates: &[DeductionUpdate]) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        for update in updates {
            // Relative to the stored value, never below zero.
            let rows = tx.execute(
                "UPDATE inventory_items SET quantity = MAX(quantity - ?1, 0), updated_at = ?2
                 WHERE id = ?3 AND deleted_at IS NULL",
                params![update.deducted, now, update.record_id],
            )?;
            if rows == 0 {
                bail!("Inventory record {} disappeared during deduction", update.record_id);
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn scope_clause(scope: &Scope) -> (&'static str, i64) {
    match scope {
        Scope::User(id) => ("i.user_id = ?1 AND i.household_id IS NULL", *id),
        Scope::Household(id) => ("i.household_id = ?1", *id),
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn like_pattern(query: &str) -> String {
    format!("%{}%", like_escape(query.trim()))
}

/// Read a stored line quantity leniently: numbers pass through, numeric text is
/// parsed, anything else (or a negative / non-finite value) becomes `None`.
#[allow(clippy::cast_precision_loss, clippy::needless_pass_by_value)]
fn decode_quantity(value: Value) -> Option<f64> {
    let q = match value {
        Value::Real(f) => f,
        Value::Integer(i) => i as f64,
        Value::Text(s) => s.trim().parse().ok()?,
        Value::Null | Value::Blob(_) => return None,
    };
    (q.is_finite() && q >= 0.0).then_some(q)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(db: &Database, name: &str, kind: NodeKind, parent: Option<i64>) -> TaxonomyNode {
        db.add_taxonomy_node(&NewTaxonomyNode {
            name: name.to_string(),
            kind,
            parent_id: parent,
            is_pantry_staple: false,
        })
        .unwrap()
    }

    fn stock(
        db: &Database,
        user_id: i64,
        taxonomy_id: i64,
        quantity: f64,
        expires: Option<&str>,
    ) -> InventoryRecord {
        db.add_inventory(&NewInventoryRecord {
            user_id,
            taxonomy_id,
            quantity,
            unit: "pcs".to_string(),
            location: "fridge".to_string(),
            expires_at: expires.map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()),
        })
        .unwrap()
    }

    fn sample_recipe(title: &str) -> NewRecipe {
        NewRecipe {
            title: title.to_string(),
            cuisine: Some("Italian".to_string()),
            difficulty: Some("easy".to_string()),
            prep_minutes: Some(10),
            cook_minutes: Some(20),
            servings: 2.0,
            is_public: true,
        }
    }

    #[test]
    fn test_taxonomy_paths_extend_parent() {
        let db = Database::open_in_memory().unwrap();
        let meat = node(&db, "Meat", NodeKind::Category, None);
        let pork = node(&db, "Pork", NodeKind::GenericFood, Some(meat.id));
        let bacon = node(&db, "Bacon", NodeKind::GenericFood, Some(pork.id));
        let branded = node(&db, "Oscar Mayer Bacon", NodeKind::BrandedProduct, Some(bacon.id));

        assert_eq!(meat.path, format!("/{}/", meat.id));
        assert_eq!(pork.path, format!("{}{}/", meat.path, pork.id));
        assert_eq!(branded.path, format!("{}{}/", bacon.path, branded.id));
        assert!(branded.path.starts_with(&pork.path));
        assert_eq!(branded.parent_id, Some(bacon.id));
    }

    #[test]
    fn test_branded_product_rules() {
        let db = Database::open_in_memory().unwrap();
        let orphan = db.add_taxonomy_node(&NewTaxonomyNode {
            name: "Loose Brand".to_string(),
            kind: NodeKind::BrandedProduct,
            parent_id: None,
            is_pantry_staple: false,
        });
        assert!(orphan.is_err());

        let bacon = node(&db, "Bacon", NodeKind::GenericFood, None);
        let brand = node(&db, "Brand Bacon", NodeKind::BrandedProduct, Some(bacon.id));
        let child = db.add_taxonomy_node(&NewTaxonomyNode {
            name: "Sub brand".to_string(),
            kind: NodeKind::BrandedProduct,
            parent_id: Some(brand.id),
            is_pantry_staple: false,
        });
        assert!(child.is_err());
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let db = Database::open_in_memory().unwrap();
        let result = db.add_taxonomy_node(&NewTaxonomyNode {
            name: "Ghost".to_string(),
            kind: NodeKind::GenericFood,
            parent_id: Some(999),
            is_pantry_staple: false,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_find_and_search_taxonomy() {
        let db = Database::open_in_memory().unwrap();
        let dairy = node(&db, "Dairy", NodeKind::Category, None);
        node(&db, "Whole Milk", NodeKind::GenericFood, Some(dairy.id));
        node(&db, "Oat Milk", NodeKind::GenericFood, None);

        let found = db.find_taxonomy_by_name("whole milk").unwrap().unwrap();
        assert_eq!(found.name, "Whole Milk");
        assert!(db.find_taxonomy_by_name("goat milk").unwrap().is_none());
        assert_eq!(db.search_taxonomy("milk").unwrap().len(), 2);
        // LIKE wildcards in the query are literal
        assert!(db.search_taxonomy("%").unwrap().is_empty());
    }

    #[test]
    fn test_children_and_subtree() {
        let db = Database::open_in_memory().unwrap();
        let meat = node(&db, "Meat", NodeKind::Category, None);
        let pork = node(&db, "Pork", NodeKind::GenericFood, Some(meat.id));
        node(&db, "Bacon", NodeKind::GenericFood, Some(pork.id));
        node(&db, "Beef", NodeKind::GenericFood, Some(meat.id));
        node(&db, "Vegetables", NodeKind::Category, None);

        assert_eq!(db.list_taxonomy_children(None).unwrap().len(), 2);
        assert_eq!(db.list_taxonomy_children(Some(meat.id)).unwrap().len(), 2);
        let subtree: Vec<String> = db
            .list_taxonomy_subtree(pork.id)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(subtree, vec!["Pork", "Bacon"]);
        assert!(db.list_taxonomy_subtree(999).unwrap().is_empty());
    }

    #[test]
    fn test_staple_flag() {
        let db = Database::open_in_memory().unwrap();
        let salt = node(&db, "Salt", NodeKind::GenericFood, None);
        assert!(db.fetch_staple_ids().unwrap().is_empty());
        db.set_pantry_staple(salt.id, true).unwrap();
        assert_eq!(db.fetch_staple_ids().unwrap(), HashSet::from([salt.id]));
        assert!(db.set_pantry_staple(999, true).is_err());
    }

    #[test]
    fn test_scope_resolution_prefers_household() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user("Alice").unwrap();
        assert_eq!(db.resolve_scope(alice.id).unwrap(), Scope::User(alice.id));

        let home = db.create_household("Home").unwrap();
        db.join_household(alice.id, home.id).unwrap();
        assert_eq!(db.resolve_scope(alice.id).unwrap(), Scope::Household(home.id));
        assert_eq!(db.get_user(alice.id).unwrap().household_id, Some(home.id));

        assert!(db.leave_household(alice.id).unwrap());
        assert_eq!(db.resolve_scope(alice.id).unwrap(), Scope::User(alice.id));
        assert!(db.join_household(alice.id, 999).is_err());
    }

    #[test]
    fn test_household_inventory_is_shared() {
        let db = Database::open_in_memory().unwrap();
        let egg = node(&db, "Egg", NodeKind::GenericFood, None);
        let milk = node(&db, "Milk", NodeKind::GenericFood, None);
        let alice = db.create_user("Alice").unwrap();
        let bob = db.create_user("Bob").unwrap();

        // Personal record from before joining is not part of the household pantry
        stock(&db, alice.id, milk.id, 1.0, None);

        let home = db.create_household("Home").unwrap();
        db.join_household(alice.id, home.id).unwrap();
        db.join_household(bob.id, home.id).unwrap();
        stock(&db, bob.id, egg.id, 6.0, None);

        let scope = db.resolve_scope(alice.id).unwrap();
        assert_eq!(db.fetch_inventory_ids(&scope).unwrap(), HashSet::from([egg.id]));
        assert_eq!(
            db.fetch_inventory_ids(&Scope::User(alice.id)).unwrap(),
            HashSet::from([milk.id])
        );
    }

    #[test]
    fn test_soft_deleted_inventory_not_owned() {
        let db = Database::open_in_memory().unwrap();
        let egg = node(&db, "Egg", NodeKind::GenericFood, None);
        let user = db.create_user("Alice").unwrap();
        let rec = stock(&db, user.id, egg.id, 6.0, None);
        let scope = Scope::User(user.id);

        assert!(db.fetch_inventory_ids(&scope).unwrap().contains(&egg.id));
        assert!(db.remove_inventory(rec.id).unwrap());
        assert!(db.fetch_inventory_ids(&scope).unwrap().is_empty());
        assert!(!db.remove_inventory(rec.id).unwrap());
        assert!(db.get_inventory(rec.id).unwrap().is_none());
    }

    #[test]
    fn test_inventory_validation() {
        let db = Database::open_in_memory().unwrap();
        let egg = node(&db, "Egg", NodeKind::GenericFood, None);
        let user = db.create_user("Alice").unwrap();
        let mut rec = NewInventoryRecord {
            user_id: user.id,
            taxonomy_id: egg.id,
            quantity: -1.0,
            unit: "pcs".to_string(),
            location: "fridge".to_string(),
            expires_at: None,
        };
        assert!(db.add_inventory(&rec).is_err());
        rec.quantity = 1.0;
        rec.location = "attic".to_string();
        assert!(db.add_inventory(&rec).is_err());
        rec.location = "pantry".to_string();
        rec.taxonomy_id = 999;
        assert!(db.add_inventory(&rec).is_err());
    }

    #[test]
    fn test_records_ordered_by_expiration_nulls_last() {
        let db = Database::open_in_memory().unwrap();
        let egg = node(&db, "Egg", NodeKind::GenericFood, None);
        let user = db.create_user("Alice").unwrap();
        let undated = stock(&db, user.id, egg.id, 6.0, None);
        let late = stock(&db, user.id, egg.id, 6.0, Some("2026-02-01"));
        let early = stock(&db, user.id, egg.id, 6.0, Some("2026-01-05"));

        let ids: Vec<i64> = db
            .fetch_inventory_records_by_expiration(&Scope::User(user.id), egg.id)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id, undated.id]);
    }

    #[test]
    fn test_list_expiring() {
        let db = Database::open_in_memory().unwrap();
        let egg = node(&db, "Egg", NodeKind::GenericFood, None);
        let user = db.create_user("Alice").unwrap();
        stock(&db, user.id, egg.id, 1.0, Some("2026-01-01"));
        stock(&db, user.id, egg.id, 1.0, Some("2026-01-04"));
        stock(&db, user.id, egg.id, 1.0, Some("2026-02-01"));
        stock(&db, user.id, egg.id, 1.0, None);

        let today = NaiveDate::from_ymd_opt(2026, 1, 2).unwrap();
        let expiring = db.list_expiring(&Scope::User(user.id), today, 3).unwrap();
        assert_eq!(expiring.len(), 2);
    }

    #[test]
    fn test_substitution_edges_filtered_by_owned() {
        let db = Database::open_in_memory().unwrap();
        let butter = node(&db, "Butter", NodeKind::GenericFood, None);
        let margarine = node(&db, "Margarine", NodeKind::GenericFood, None);
        let oil = node(&db, "Oil", NodeKind::GenericFood, None);
        db.add_substitution(butter.id, margarine.id, MatchType::Close).unwrap();
        db.add_substitution(butter.id, oil.id, MatchType::Generic).unwrap();

        let edges = db
            .fetch_substitution_edges(&HashSet::from([margarine.id]))
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].match_type, MatchType::Close);
        assert!(db.fetch_substitution_edges(&HashSet::new()).unwrap().is_empty());

        // Re-adding replaces the match type
        db.add_substitution(butter.id, margarine.id, MatchType::Exact).unwrap();
        let all = db.list_substitutions(Some(butter.id)).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|e| e.match_type == MatchType::Exact));

        assert!(db.add_substitution(butter.id, butter.id, MatchType::Exact).is_err());
        assert!(db.remove_substitution(butter.id, oil.id).unwrap());
        assert_eq!(db.list_substitutions(None).unwrap().len(), 1);
    }

    #[test]
    fn test_recipe_lines_keep_order() {
        let db = Database::open_in_memory().unwrap();
        let egg = node(&db, "Egg", NodeKind::GenericFood, None);
        let recipe = db.create_recipe(&sample_recipe("Omelette")).unwrap();
        for (tid, name) in [(Some(egg.id), "3 eggs"), (None, "chives"), (None, "salt")] {
            db.add_ingredient_line(
                recipe.id,
                &NewIngredientLine {
                    taxonomy_id: tid,
                    display_name: name.to_string(),
                    quantity: Some(1.0),
                    unit: None,
                    is_optional: false,
                },
            )
            .unwrap();
        }
        let detail = db.get_recipe_detail(recipe.id).unwrap();
        let names: Vec<&str> = detail
            .ingredients
            .iter()
            .map(|l| l.display_name.as_str())
            .collect();
        assert_eq!(names, vec!["3 eggs", "chives", "salt"]);
        assert_eq!(detail.ingredients[0].taxonomy_id, Some(egg.id));

        assert!(db.remove_ingredient_line(recipe.id, "Chives").unwrap());
        assert_eq!(db.get_recipe_detail(recipe.id).unwrap().ingredients.len(), 2);
    }

    #[test]
    fn test_malformed_quantity_reads_as_none() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&sample_recipe("Mystery stew")).unwrap();
        db.conn
            .execute(
                "INSERT INTO recipe_ingredients (recipe_id, position, display_name, quantity)
                 VALUES (?1, 0, 'a handful of herbs', 'a handful'), (?1, 1, 'stock', '2.5')",
                params![recipe.id],
            )
            .unwrap();
        let lines = db.fetch_ingredient_lines(&[recipe.id]).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].quantity.is_none());
        assert_eq!(lines[1].quantity, Some(2.5));
    }

    #[test]
    fn test_decode_quantity() {
        assert_eq!(decode_quantity(Value::Integer(3)), Some(3.0));
        assert_eq!(decode_quantity(Value::Text(" 1.5 ".to_string())), Some(1.5));
        assert_eq!(decode_quantity(Value::Real(-2.0)), None);
        assert_eq!(decode_quantity(Value::Null), None);
        assert_eq!(decode_quantity(Value::Text("lots".to_string())), None);
    }

    #[test]
    fn test_candidate_recipes_filters() {
        let db = Database::open_in_memory().unwrap();
        let carbonara = db.create_recipe(&sample_recipe("Spaghetti Carbonara")).unwrap();
        db.create_recipe(&NewRecipe {
            cuisine: Some("Thai".to_string()),
            difficulty: Some("hard".to_string()),
            ..sample_recipe("Green Curry")
        })
        .unwrap();
        let private = db
            .create_recipe(&NewRecipe {
                is_public: false,
                ..sample_recipe("Secret Sauce")
            })
            .unwrap();
        let deleted = db.create_recipe(&sample_recipe("Old Lasagna")).unwrap();
        db.delete_recipe(deleted.id).unwrap();

        let all = db.fetch_candidate_recipes(&RecipeFilters::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.id != private.id && r.id != deleted.id));

        let italian = db
            .fetch_candidate_recipes(&RecipeFilters {
                cuisine: Some("italian".to_string()),
                ..RecipeFilters::default()
            })
            .unwrap();
        assert_eq!(italian.len(), 1);
        assert_eq!(italian[0].id, carbonara.id);

        let by_text = db
            .fetch_candidate_recipes(&RecipeFilters {
                query: Some("curry".to_string()),
                difficulty: Some("HARD".to_string()),
                ..RecipeFilters::default()
            })
            .unwrap();
        assert_eq!(by_text.len(), 1);

        let none = db
            .fetch_candidate_recipes(&RecipeFilters {
                cuisine: Some("Martian".to_string()),
                ..RecipeFilters::default()
            })
            .unwrap();
        assert!(none.is_empty());

        assert_eq!(db.list_recipes(true).unwrap().len(), 3);
    }

    #[test]
    fn test_persist_deduction_clamps_at_zero() {
        let db = Database::open_in_memory().unwrap();
        let egg = node(&db, "Egg", NodeKind::GenericFood, None);
        let user = db.create_user("Alice").unwrap();
        let rec = stock(&db, user.id, egg.id, 2.0, None);

        db.persist_deduction(&[DeductionUpdate {
            record_id: rec.id,
            taxonomy_id: egg.id,
            deducted: 5.0,
            new_quantity: 0.0,
        }])
        .unwrap();
        let after = db.get_inventory(rec.id).unwrap().unwrap();
        assert!((after.quantity - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_persist_deduction_is_all_or_nothing() {
        let db = Database::open_in_memory().unwrap();
        let egg = node(&db, "Egg", NodeKind::GenericFood, None);
        let user = db.create_user("Alice").unwrap();
        let first = stock(&db, user.id, egg.id, 6.0, None);

        let result = db.persist_deduction(&[
            DeductionUpdate {
                record_id: first.id,
                taxonomy_id: egg.id,
                deducted: 2.0,
                new_quantity: 4.0,
            },
            DeductionUpdate {
                record_id: 999,
                taxonomy_id: egg.id,
                deducted: 1.0,
                new_quantity: 0.0,
            },
        ]);
        assert!(result.is_err());
        let after = db.get_inventory(first.id).unwrap().unwrap();
        assert!((after.quantity - 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_settings_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("default_max_missing").unwrap().is_none());
        db.set_setting("default_max_missing", "3").unwrap();
        db.set_setting("default_max_missing", "2").unwrap();
        assert_eq!(db.get_setting("default_max_missing").unwrap().as_deref(), Some("2"));
        assert!(db.delete_setting("default_max_missing").unwrap());
        assert!(!db.delete_setting("default_max_missing").unwrap());
    }

    #[test]
    fn test_search_defaults_from_settings() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.search_defaults().unwrap(), SearchDefaults::default());

        db.update_setting(SETTING_DEFAULT_MAX_MISSING, "2").unwrap();
        db.update_setting(SETTING_ASSUME_STAPLES, "off").unwrap();
        let defaults = db.search_defaults().unwrap();
        assert_eq!(defaults.max_missing, 2);
        assert!(!defaults.assume_pantry_staples);

        assert!(db.update_setting(SETTING_DEFAULT_MAX_MISSING, "many").is_err());
        // A hand-edited bad value is ignored rather than failing searches
        db.set_setting(SETTING_DEFAULT_MAX_MISSING, "many").unwrap();
        assert_eq!(db.search_defaults().unwrap().max_missing, 5);
    }
}
