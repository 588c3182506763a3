use anyhow::Result;
use std::collections::HashMap;
use std::process;
use tabled::{Table, Tabled, settings::Style};

use larder_core::db::Database;
use larder_core::models::MatchType;
use larder_core::store::PantryStore;

use super::helpers::{json_error, print_json, resolve_node};

pub(crate) fn cmd_sub_add(
    db: &Database,
    required: &str,
    substitute: &str,
    match_type: &str,
    json: bool,
) -> Result<()> {
    let match_type = MatchType::parse(match_type)?;
    let required = resolve_node(db, required)?;
    let substitute = resolve_node(db, substitute)?;
    let edge = db.add_substitution(required.id, substitute.id, match_type)?;
    if json {
        print_json(&edge)?;
    } else {
        println!(
            "{} can stand in for {} ({match_type}, weight {})",
            substitute.name,
            required.name,
            match_type.weight()
        );
    }
    Ok(())
}

pub(crate) fn cmd_sub_list(db: &Database, required: Option<&str>, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct SubRow {
        #[tabled(rename = "Required")]
        required: String,
        #[tabled(rename = "Substitute")]
        substitute: String,
        #[tabled(rename = "Match")]
        match_type: String,
        #[tabled(rename = "Weight")]
        weight: String,
    }

    let required_id = required
        .map(|r| resolve_node(db, r).map(|n| n.id))
        .transpose()?;
    let edges = db.list_substitutions(required_id)?;
    if json {
        return print_json(&edges);
    }
    if edges.is_empty() {
        eprintln!("No substitutions defined");
        return Ok(());
    }

    let mut ids: Vec<i64> = edges
        .iter()
        .flat_map(|e| [e.required_id, e.substitute_id])
        .collect();
    ids.sort_unstable();
    ids.dedup();
    let names: HashMap<i64, String> = db
        .fetch_taxonomy_nodes(&ids)?
        .into_iter()
        .map(|n| (n.id, n.name))
        .collect();
    let name_of = |id: i64| names.get(&id).cloned().unwrap_or_else(|| id.to_string());

    let rows: Vec<SubRow> = edges
        .iter()
        .map(|e| SubRow {
            required: name_of(e.required_id),
            substitute: name_of(e.substitute_id),
            match_type: e.match_type.to_string(),
            weight: format!("{:.2}", e.match_type.weight()),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_sub_remove(
    db: &Database,
    required: &str,
    substitute: &str,
    json: bool,
) -> Result<()> {
    let required = resolve_node(db, required)?;
    let substitute = resolve_node(db, substitute)?;
    if db.remove_substitution(required.id, substitute.id)? {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "removed": {
                        "required_id": required.id,
                        "substitute_id": substitute.id,
                    }
                })
            );
        } else {
            println!("Removed substitution {} -> {}", substitute.name, required.name);
        }
    } else {
        let msg = format!(
            "No substitution of {} for {}",
            substitute.name, required.name
        );
        if json {
            println!("{}", json_error(&msg));
        } else {
            eprintln!("{msg}");
        }
        process::exit(2);
    }
    Ok(())
}
