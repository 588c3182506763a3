use anyhow::{Context, Result, bail};
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::db::Database;
use larder_core::models::{NewIngredientLine, NewRecipe, RecipeSummary};
use larder_core::service::PantryService;

use super::helpers::{
    format_quantity, json_error, parse_quantity, print_json, resolve_node, truncate,
};
use super::search::print_line_outcomes;

/// Recipe metadata collected from command-line flags.
pub(crate) struct RecipeArgs {
    pub title: String,
    pub cuisine: Option<String>,
    pub difficulty: Option<String>,
    pub prep_minutes: Option<i64>,
    pub cook_minutes: Option<i64>,
    pub servings: f64,
    pub private: bool,
}

/// Look a recipe up by numeric id or by title.
fn resolve_recipe(db: &Database, recipe: &str) -> Result<RecipeSummary> {
    if let Ok(id) = recipe.trim().parse::<i64>() {
        return db
            .get_recipe(id)?
            .with_context(|| format!("Recipe {id} not found"));
    }
    db.get_recipe_by_title(recipe)
}

pub(crate) fn cmd_recipe_create(db: &Database, args: RecipeArgs, json: bool) -> Result<()> {
    let recipe = db.create_recipe(&NewRecipe {
        title: args.title,
        cuisine: args.cuisine,
        difficulty: args.difficulty,
        prep_minutes: args.prep_minutes,
        cook_minutes: args.cook_minutes,
        servings: args.servings,
        is_public: !args.private,
    })?;
    if json {
        print_json(&recipe)?;
    } else {
        let title = &recipe.title;
        let id = recipe.id;
        println!("Created recipe: {title} (id: {id})");
        println!("Add ingredients with: larder recipe add-ingredient {id} <food> <quantity>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_add_ingredient(
    db: &Database,
    recipe: &str,
    food: &str,
    quantity: Option<&str>,
    unlinked: bool,
    optional: bool,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe)?;
    let (amount, unit) = match quantity {
        Some(q) => {
            let (amount, unit) = parse_quantity(q)?;
            (Some(amount), unit)
        }
        None => (None, None),
    };
    let taxonomy_id = if unlinked {
        None
    } else {
        Some(resolve_node(db, food)?.id)
    };

    let line = db.add_ingredient_line(
        recipe.id,
        &NewIngredientLine {
            taxonomy_id,
            display_name: food.to_string(),
            quantity: amount,
            unit,
            is_optional: optional,
        },
    )?;

    if json {
        print_json(&line)?;
    } else {
        let qty = line.quantity.map(format_quantity).unwrap_or_default();
        let unit = line.unit.as_deref().unwrap_or_default();
        let title = &recipe.title;
        let name = &line.display_name;
        let amount = format!("{qty} {unit}");
        let amount = amount.trim();
        if amount.is_empty() {
            println!("Added {name} to {title}");
        } else {
            println!("Added {amount} {name} to {title}");
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_remove_ingredient(
    db: &Database,
    recipe: &str,
    ingredient: &str,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe)?;
    let title = &recipe.title;
    if db.remove_ingredient_line(recipe.id, ingredient)? {
        if json {
            println!("{}", serde_json::json!({ "removed": ingredient }));
        } else {
            println!("Removed {ingredient} from {title}");
        }
    } else {
        if json {
            println!(
                "{}",
                json_error(&format!("Ingredient '{ingredient}' not found in recipe"))
            );
        } else {
            eprintln!("Ingredient '{ingredient}' not found in recipe");
        }
        process::exit(2);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(
    db: &Database,
    user_id: i64,
    recipe: &str,
    coverage: bool,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe)?;

    if coverage {
        let service = PantryService::new(db).with_defaults(db.search_defaults()?);
        let result = service
            .recipe_coverage(user_id, recipe.id, None)?
            .with_context(|| format!("Recipe {} not found", recipe.id))?;
        if json {
            return print_json(&result);
        }
        let title = &result.recipe.title;
        let pct = result.coverage_percentage;
        let owned = result.owned_ingredients;
        let total = result.total_ingredients;
        println!("=== {title} === {pct}% covered ({owned}/{total} ingredients)\n");
        print_line_outcomes(&result.lines);
        return Ok(());
    }

    let detail = db.get_recipe_detail(recipe.id)?;
    if json {
        return print_json(&detail);
    }

    let r = &detail.recipe;
    println!("=== {} ===", r.title);
    let mut facts = Vec::new();
    if let Some(c) = &r.cuisine {
        facts.push(format!("Cuisine: {c}"));
    }
    if let Some(d) = &r.difficulty {
        facts.push(format!("Difficulty: {d}"));
    }
    if let Some(m) = r.prep_minutes {
        facts.push(format!("Prep: {m} min"));
    }
    if let Some(m) = r.cook_minutes {
        facts.push(format!("Cook: {m} min"));
    }
    facts.push(format!("Serves: {}", format_quantity(r.servings)));
    if !r.is_public {
        facts.push("private".to_string());
    }
    println!("  {}\n", facts.join("  |  "));

    println!("  INGREDIENTS:");
    for line in &detail.ingredients {
        let qty = line.quantity.map(format_quantity).unwrap_or_default();
        let unit = line.unit.as_deref().unwrap_or_default();
        let mut tags = Vec::new();
        if line.is_optional {
            tags.push("optional");
        }
        if line.taxonomy_id.is_none() {
            tags.push("unlinked");
        }
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" ({})", tags.join(", "))
        };
        let name = &line.display_name;
        println!("    {}{tags}", format!("{qty} {unit} {name}").trim());
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(db: &Database, all: bool, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Cuisine")]
        cuisine: String,
        #[tabled(rename = "Difficulty")]
        difficulty: String,
        #[tabled(rename = "Minutes")]
        minutes: String,
        #[tabled(rename = "Serves")]
        servings: String,
    }

    let recipes = db.list_recipes(all)?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        return print_json(&recipes);
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            title: truncate(&r.title, 35),
            cuisine: r.cuisine.clone().unwrap_or_default(),
            difficulty: r.difficulty.clone().unwrap_or_default(),
            minutes: match (r.prep_minutes, r.cook_minutes) {
                (None, None) => "-".to_string(),
                (p, c) => (p.unwrap_or(0) + c.unwrap_or(0)).to_string(),
            },
            servings: format_quantity(r.servings),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_recipe_publish(
    db: &Database,
    recipe: &str,
    public: bool,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(db, recipe)?;
    db.set_recipe_public(recipe.id, public)?;
    if json {
        println!("{}", serde_json::json!({ "id": recipe.id, "is_public": public }));
    } else if public {
        println!("{} is now public", recipe.title);
    } else {
        println!("{} is now private", recipe.title);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(db: &Database, recipe: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(db, recipe)?;
    db.delete_recipe(recipe.id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": recipe.id }));
    } else {
        println!("Deleted recipe {} ({})", recipe.title, recipe.id);
    }
    Ok(())
}

/// One ingredient pulled out of a Cooklang file.
#[derive(Debug, Clone, PartialEq)]
struct ImportedIngredient {
    name: String,
    quantity: Option<f64>,
    unit: Option<String>,
}

pub(crate) fn cmd_recipe_import(
    db: &Database,
    file: &std::path::Path,
    title_override: Option<String>,
    servings_override: Option<f64>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let title = title_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe title. Use --title to specify one")?;

    let servings = servings_override
        .or_else(|| {
            recipe_data
                .metadata
                .servings()
                .and_then(|s| s.as_number().map(f64::from))
        })
        .unwrap_or(1.0);

    let converter = cooklang::Converter::default();
    let grouped = recipe_data.group_ingredients(&converter);
    let ingredients: Vec<ImportedIngredient> = grouped.iter().map(imported_ingredient).collect();

    if ingredients.is_empty() {
        bail!("No ingredients found in recipe");
    }

    let recipe = db.create_recipe(&NewRecipe {
        title,
        servings,
        is_public: true,
        ..NewRecipe::default()
    })?;
    let unlinked = import_ingredients(db, recipe.id, &ingredients)?;

    if !unlinked.is_empty() {
        eprintln!("Not in the taxonomy (imported as unlinked lines):");
        for name in &unlinked {
            eprintln!("  {name}");
        }
    }

    let detail = db.get_recipe_detail(recipe.id)?;
    if json {
        print_json(&detail)?;
    } else {
        let rtitle = &detail.recipe.title;
        let count = detail.ingredients.len();
        let linked = count - unlinked.len();
        println!(
            "Imported recipe: {rtitle} ({count} ingredients, {linked} linked to the taxonomy)"
        );
    }
    Ok(())
}

fn imported_ingredient(
    gi: &cooklang::ingredient_list::GroupedIngredient<'_>,
) -> ImportedIngredient {
    // Take the first quantity from the grouped quantities (if any)
    let (quantity, unit) =
        gi.quantity
            .iter()
            .next()
            .map_or((None, None), |qty: &cooklang::Quantity| {
                let value = match qty.value() {
                    cooklang::Value::Number(n) => Some(n.value()),
                    cooklang::Value::Range { start, .. } => Some(start.value()),
                    cooklang::Value::Text(t) => t.trim().parse::<f64>().ok(),
                };
                (value, qty.unit().map(str::to_lowercase))
            });

    ImportedIngredient {
        name: gi.ingredient.display_name().to_string(),
        quantity: quantity.filter(|q| q.is_finite() && *q >= 0.0),
        unit,
    }
}

/// Add every ingredient, linking it to the taxonomy by exact (case-insensitive)
/// name. Returns the names that stayed unlinked.
fn import_ingredients(
    db: &Database,
    recipe_id: i64,
    ingredients: &[ImportedIngredient],
) -> Result<Vec<String>> {
    let mut unlinked = Vec::new();
    for ing in ingredients {
        let taxonomy_id = db.find_taxonomy_by_name(&ing.name)?.map(|n| n.id);
        if taxonomy_id.is_none() {
            unlinked.push(ing.name.clone());
        }
        db.add_ingredient_line(
            recipe_id,
            &NewIngredientLine {
                taxonomy_id,
                display_name: ing.name.clone(),
                quantity: ing.quantity,
                unit: ing.unit.clone(),
                is_optional: false,
            },
        )?;
    }
    Ok(unlinked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::models::{NewTaxonomyNode, NodeKind};

    #[test]
    fn import_links_known_ingredients() {
        let db = Database::open_in_memory().unwrap();
        let egg = db
            .add_taxonomy_node(&NewTaxonomyNode {
                name: "Eggs".to_string(),
                kind: NodeKind::GenericFood,
                parent_id: None,
                is_pantry_staple: false,
            })
            .unwrap();
        let recipe = db
            .create_recipe(&NewRecipe {
                title: "Omelette".to_string(),
                servings: 1.0,
                is_public: true,
                ..NewRecipe::default()
            })
            .unwrap();

        let unlinked = import_ingredients(
            &db,
            recipe.id,
            &[
                ImportedIngredient {
                    name: "eggs".to_string(),
                    quantity: Some(3.0),
                    unit: None,
                },
                ImportedIngredient {
                    name: "fresh chives".to_string(),
                    quantity: None,
                    unit: None,
                },
            ],
        )
        .unwrap();

        assert_eq!(unlinked, vec!["fresh chives"]);
        let detail = db.get_recipe_detail(recipe.id).unwrap();
        assert_eq!(detail.ingredients[0].taxonomy_id, Some(egg.id));
        assert_eq!(detail.ingredients[1].taxonomy_id, None);
    }

    #[test]
    fn import_from_cooklang_file() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pancakes.cook");
        std::fs::write(
            &path,
            "Whisk @eggs{3} with @milk{250%ml} and @flour{125%g}.\n",
        )
        .unwrap();

        cmd_recipe_import(&db, &path, None, Some(2.0), true).unwrap();
        let recipe = db.get_recipe_by_title("pancakes").unwrap();
        assert!((recipe.servings - 2.0).abs() < f64::EPSILON);
        let detail = db.get_recipe_detail(recipe.id).unwrap();
        assert_eq!(detail.ingredients.len(), 3);
        assert!(detail.ingredients.iter().all(|l| l.taxonomy_id.is_none()));
        let milk = detail
            .ingredients
            .iter()
            .find(|l| l.display_name == "milk")
            .unwrap();
        assert_eq!(milk.quantity, Some(250.0));
        assert_eq!(milk.unit.as_deref(), Some("ml"));
    }

    #[test]
    fn resolve_recipe_by_id_or_title() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db
            .create_recipe(&NewRecipe {
                title: "Green Curry".to_string(),
                servings: 4.0,
                is_public: true,
                ..NewRecipe::default()
            })
            .unwrap();
        assert_eq!(resolve_recipe(&db, &recipe.id.to_string()).unwrap().id, recipe.id);
        assert_eq!(resolve_recipe(&db, "green curry").unwrap().id, recipe.id);
        assert!(resolve_recipe(&db, "red curry").is_err());
    }
}
