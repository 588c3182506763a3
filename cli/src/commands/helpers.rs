use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::db::Database;
use larder_core::models::{InventoryRecord, TaxonomyNode};

/// Split a quantity like "200g", "2 cups" or "3" into `(amount, unit)`.
pub(crate) fn parse_quantity(s: &str) -> Result<(f64, Option<String>)> {
    let s = s.trim();
    let (num_part, unit_part) = match s.find(|c: char| c.is_alphabetic()) {
        Some(0) => bail!("Invalid quantity '{s}'. Start with a number, e.g. '200g' or '2 cups'"),
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    };
    let amount: f64 = num_part
        .trim()
        .parse()
        .with_context(|| format!("Invalid quantity: '{s}'"))?;
    if !amount.is_finite() || amount < 0.0 {
        bail!("Quantity must be a non-negative number");
    }
    let unit = unit_part.trim();
    let unit = (!unit.is_empty()).then(|| unit.to_lowercase());
    Ok((amount, unit))
}

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// Parse an optional expiry: a date, or `+N` for N days from today.
pub(crate) fn parse_expiry(s: Option<String>) -> Result<Option<NaiveDate>> {
    let Some(s) = s else {
        return Ok(None);
    };
    if let Some(days) = s.strip_prefix('+') {
        let days: i64 = days
            .parse()
            .with_context(|| format!("Invalid expiry '{s}'. Use +N for N days from today"))?;
        return Ok(Some(Local::now().date_naive() + chrono::Duration::days(days)));
    }
    parse_date(Some(s)).map(Some)
}

/// Resolve a food argument to a taxonomy node: a numeric id, an exact name, or a
/// search with an interactive pick when several nodes match.
pub(crate) fn resolve_node(db: &Database, food: &str) -> Result<TaxonomyNode> {
    if let Ok(id) = food.trim().parse::<i64>() {
        return db
            .get_taxonomy_node(id)?
            .with_context(|| format!("No taxonomy node with id {id}"));
    }
    if let Some(node) = db.find_taxonomy_by_name(food)? {
        return Ok(node);
    }
    let mut candidates = db.search_taxonomy(food)?;
    match candidates.len() {
        0 => bail!("No food matching '{food}'. Add it with: larder taxonomy add \"{food}\""),
        1 => Ok(candidates.remove(0)),
        n => {
            let refs: Vec<&TaxonomyNode> = candidates.iter().collect();
            print_node_table(&refs);
            let idx = prompt_choice(n)?;
            Ok(candidates.swap_remove(idx))
        }
    }
}

pub(crate) fn prompt_choice(count: usize) -> Result<usize> {
    eprint!("\nSelect a food (1-{count}): ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    let n: usize = line.trim().parse().context("Invalid number")?;
    if n < 1 || n > count {
        bail!("Selection out of range");
    }
    Ok(n - 1)
}

pub(crate) fn print_node_table(nodes: &[&TaxonomyNode]) {
    #[derive(Tabled)]
    struct NodeRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Kind")]
        kind: String,
        #[tabled(rename = "Path")]
        path: String,
        #[tabled(rename = "Staple")]
        staple: String,
    }

    let rows: Vec<NodeRow> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| NodeRow {
            idx: i + 1,
            id: n.id,
            name: format!("{}{}", "  ".repeat(n.depth()), truncate(&n.name, 35)),
            kind: n.kind.to_string(),
            path: n.path.clone(),
            staple: if n.is_pantry_staple { "yes".into() } else { String::new() },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_inventory_table(records: &[InventoryRecord]) {
    #[derive(Tabled)]
    struct InventoryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Qty")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Location")]
        location: String,
        #[tabled(rename = "Expires")]
        expires: String,
    }

    let rows: Vec<InventoryRow> = records
        .iter()
        .map(|r| InventoryRow {
            id: r.id,
            food: truncate(r.food_name.as_deref().unwrap_or("?"), 30),
            quantity: format_quantity(r.quantity),
            unit: r.unit.clone(),
            location: r.location.clone(),
            expires: r
                .expires_at
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Drop a pointless ".0" and never print "-0".
pub(crate) fn format_quantity(v: f64) -> String {
    let v = if v == 0.0 { 0.0 } else { v };
    if (v - v.round()).abs() < 1e-9 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}").trim_end_matches('0').to_string()
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::models::{NewTaxonomyNode, NodeKind};

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("3").unwrap(), (3.0, None));
        assert_eq!(parse_quantity("200g").unwrap(), (200.0, Some("g".to_string())));
        assert_eq!(
            parse_quantity("2.5 Cups").unwrap(),
            (2.5, Some("cups".to_string()))
        );
    }

    #[test]
    fn test_parse_quantity_invalid() {
        assert!(parse_quantity("abc").is_err());
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("-2 kg").is_err());
    }

    #[test]
    fn test_parse_date_keywords() {
        let today = Local::now().date_naive();
        assert_eq!(parse_date(None).unwrap(), today);
        assert_eq!(parse_date(Some("today".to_string())).unwrap(), today);
        assert_eq!(
            parse_date(Some("tomorrow".to_string())).unwrap(),
            today + chrono::Duration::days(1)
        );
    }

    #[test]
    fn test_parse_date_iso() {
        let date = parse_date(Some("2024-01-15".to_string())).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert!(parse_date(Some("nope".to_string())).is_err());
    }

    #[test]
    fn test_parse_expiry() {
        let today = Local::now().date_naive();
        assert_eq!(parse_expiry(None).unwrap(), None);
        assert_eq!(
            parse_expiry(Some("+3".to_string())).unwrap(),
            Some(today + chrono::Duration::days(3))
        );
        assert!(parse_expiry(Some("+soon".to_string())).is_err());
    }

    #[test]
    fn test_resolve_node_by_id_and_name() {
        let db = Database::open_in_memory().unwrap();
        let milk = db
            .add_taxonomy_node(&NewTaxonomyNode {
                name: "Whole Milk".to_string(),
                kind: NodeKind::GenericFood,
                parent_id: None,
                is_pantry_staple: false,
            })
            .unwrap();
        assert_eq!(resolve_node(&db, &milk.id.to_string()).unwrap().id, milk.id);
        assert_eq!(resolve_node(&db, "whole milk").unwrap().id, milk.id);
        // Single partial match needs no prompt
        assert_eq!(resolve_node(&db, "milk").unwrap().id, milk.id);
        assert!(resolve_node(&db, "cheese").is_err());
        assert!(resolve_node(&db, "999").is_err());
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(2.0), "2");
        assert_eq!(format_quantity(-0.0), "0");
        assert_eq!(format_quantity(0.5), "0.5");
        assert_eq!(format_quantity(1.25), "1.25");
    }

    #[test]
    fn test_truncate_utf8() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("Crème fraîche", 10), "Crème f...");
    }

    #[test]
    fn test_json_error() {
        assert_eq!(json_error("nope"), r#"{"error":"nope"}"#);
    }
}
