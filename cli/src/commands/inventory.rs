use anyhow::{Result, bail};
use chrono::Local;
use std::process;

use larder_core::db::Database;
use larder_core::models::NewInventoryRecord;
use larder_core::store::PantryStore;

use super::helpers::{
    format_quantity, json_error, parse_expiry, parse_quantity, print_inventory_table, print_json,
    resolve_node,
};

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_inventory_add(
    db: &Database,
    user_id: i64,
    food: &str,
    quantity: &str,
    unit: Option<String>,
    location: &str,
    expires: Option<String>,
    json: bool,
) -> Result<()> {
    let node = resolve_node(db, food)?;
    let (amount, parsed_unit) = parse_quantity(quantity)?;
    let unit = match (unit, parsed_unit) {
        (Some(u), Some(p)) if !u.eq_ignore_ascii_case(&p) => {
            bail!("Conflicting units '{u}' and '{p}'")
        }
        (Some(u), _) => u,
        (None, Some(p)) => p,
        (None, None) => "pcs".to_string(),
    };
    let record = db.add_inventory(&NewInventoryRecord {
        user_id,
        taxonomy_id: node.id,
        quantity: amount,
        unit,
        location: location.to_string(),
        expires_at: parse_expiry(expires)?,
    })?;

    if json {
        print_json(&record)?;
    } else {
        let qty = format_quantity(record.quantity);
        let unit = &record.unit;
        let name = &node.name;
        let id = record.id;
        match record.expires_at {
            Some(d) => println!("Added {qty} {unit} of {name} (id: {id}, expires {d})"),
            None => println!("Added {qty} {unit} of {name} (id: {id})"),
        }
    }
    Ok(())
}

pub(crate) fn cmd_inventory_list(db: &Database, user_id: i64, json: bool) -> Result<()> {
    let scope = db.resolve_scope(user_id)?;
    let records = db.list_inventory(&scope)?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        eprintln!("Inventory is empty ({scope})");
        return Ok(());
    }
    print_inventory_table(&records);
    Ok(())
}

pub(crate) fn cmd_inventory_expiring(
    db: &Database,
    user_id: i64,
    days: i64,
    json: bool,
) -> Result<()> {
    let scope = db.resolve_scope(user_id)?;
    let records = db.list_expiring(&scope, Local::now().date_naive(), days)?;
    if json {
        return print_json(&records);
    }
    if records.is_empty() {
        eprintln!("Nothing expires in the next {days} days");
        return Ok(());
    }
    print_inventory_table(&records);
    Ok(())
}

pub(crate) fn cmd_inventory_set(db: &Database, id: i64, quantity: &str, json: bool) -> Result<()> {
    let (amount, _) = parse_quantity(quantity)?;
    let record = db.set_inventory_quantity(id, amount)?;
    if json {
        print_json(&record)?;
    } else {
        println!(
            "Inventory record {id} now holds {} {}",
            format_quantity(record.quantity),
            record.unit
        );
    }
    Ok(())
}

pub(crate) fn cmd_inventory_remove(db: &Database, id: i64, json: bool) -> Result<()> {
    if db.remove_inventory(id)? {
        if json {
            println!("{}", serde_json::json!({ "removed": id }));
        } else {
            println!("Removed inventory record {id}");
        }
    } else {
        if json {
            println!("{}", json_error(&format!("Inventory record {id} not found")));
        } else {
            eprintln!("Inventory record {id} not found");
        }
        process::exit(2);
    }
    Ok(())
}
