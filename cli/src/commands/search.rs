use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::coverage::{LineMatch, LineOutcome};
use larder_core::db::Database;
use larder_core::models::SearchOptions;
use larder_core::service::PantryService;

use super::helpers::{format_quantity, print_json, truncate};

pub(crate) fn cmd_search(
    db: &Database,
    user_id: i64,
    options: &SearchOptions,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct MatchRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Recipe")]
        title: String,
        #[tabled(rename = "Coverage")]
        coverage: String,
        #[tabled(rename = "Have")]
        have: String,
        #[tabled(rename = "Missing")]
        missing: String,
    }

    let service = PantryService::new(db).with_defaults(db.search_defaults()?);
    let matches = service.smart_search(user_id, options)?;

    if json {
        return print_json(&matches);
    }
    if matches.is_empty() {
        eprintln!("No recipes within reach. Try --max-missing with a larger number");
        return Ok(());
    }

    let rows: Vec<MatchRow> = matches
        .iter()
        .map(|m| MatchRow {
            id: m.recipe.id,
            title: truncate(&m.recipe.title, 35),
            coverage: format!("{}%", m.coverage_percentage),
            have: format!("{}/{}", m.owned_ingredients, m.total_ingredients),
            missing: truncate(&m.missing_ingredients.join(", "), 50),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_stats(db: &Database, user_id: i64, json: bool) -> Result<()> {
    let service = PantryService::new(db).with_defaults(db.search_defaults()?);
    let stats = service.coverage_stats(user_id)?;
    if json {
        return print_json(&stats);
    }
    println!("Recipes:         {}", stats.total);
    println!("  Ready to cook: {}", stats.fully_matched);
    println!("  Almost there:  {}", stats.almost_there);
    println!("  Need shopping: {}", stats.needs_shopping);
    Ok(())
}

pub(crate) fn cmd_cook(
    db: &Database,
    user_id: i64,
    recipe_id: i64,
    servings: f64,
    json: bool,
) -> Result<()> {
    let report = PantryService::new(db).mark_cooked(user_id, recipe_id, servings)?;
    if json {
        return print_json(&report);
    }

    println!(
        "Marked recipe {recipe_id} as cooked ({} servings), {} inventory records updated",
        format_quantity(servings),
        report.updates.len()
    );
    for line in &report.lines {
        let name = &line.display_name;
        let used = format_quantity(line.deducted);
        if line.shortfall > 0.0 {
            let short = format_quantity(line.shortfall);
            println!("  {name}: used {used}, short by {short}");
        } else {
            println!("  {name}: used {used}");
        }
    }
    Ok(())
}

/// Per-line explanation of a coverage score.
pub(crate) fn print_line_outcomes(lines: &[LineOutcome]) {
    for line in lines {
        let why = match line.matched {
            LineMatch::Exact => "in stock".to_string(),
            LineMatch::Staple => "pantry staple".to_string(),
            LineMatch::Optional => "optional".to_string(),
            LineMatch::Taxonomy => "more specific item in stock".to_string(),
            LineMatch::Substitution { match_type } => format!("{match_type} substitute in stock"),
            LineMatch::Missing => "MISSING".to_string(),
        };
        let weight = line.weight;
        println!("  {:<30} {why} ({weight:.2})", truncate(&line.display_name, 30));
    }
}
