use anyhow::{Context, Result};
use std::process;

use larder_core::db::Database;
use larder_core::models::{NewTaxonomyNode, NodeKind};

use super::helpers::{json_error, print_json, print_node_table, resolve_node};

pub(crate) fn cmd_taxonomy_add(
    db: &Database,
    name: &str,
    kind: &str,
    parent: Option<&str>,
    staple: bool,
    json: bool,
) -> Result<()> {
    let kind = NodeKind::parse(kind)?;
    let parent_id = parent
        .map(|p| resolve_node(db, p).map(|n| n.id))
        .transpose()?;
    let node = db.add_taxonomy_node(&NewTaxonomyNode {
        name: name.to_string(),
        kind,
        parent_id,
        is_pantry_staple: staple,
    })?;
    if json {
        print_json(&node)?;
    } else {
        let id = node.id;
        let path = &node.path;
        println!("Added {kind} '{name}' (id: {id}, path: {path})");
    }
    Ok(())
}

pub(crate) fn cmd_taxonomy_show(db: &Database, food: &str, json: bool) -> Result<()> {
    let node = resolve_node(db, food)?;
    let subtree = db.list_taxonomy_subtree(node.id)?;
    if json {
        print_json(&subtree)?;
        return Ok(());
    }
    let refs: Vec<_> = subtree.iter().collect();
    print_node_table(&refs);
    Ok(())
}

pub(crate) fn cmd_taxonomy_search(db: &Database, query: &str, json: bool) -> Result<()> {
    let nodes = db.search_taxonomy(query)?;
    if nodes.is_empty() {
        if json {
            println!("{}", json_error(&format!("No food matching '{query}'")));
        } else {
            eprintln!("No food matching '{query}'");
        }
        process::exit(2);
    }
    if json {
        return print_json(&nodes);
    }
    let refs: Vec<_> = nodes.iter().collect();
    print_node_table(&refs);
    Ok(())
}

pub(crate) fn cmd_taxonomy_children(db: &Database, parent: Option<&str>, json: bool) -> Result<()> {
    let parent_id = parent
        .map(|p| resolve_node(db, p).map(|n| n.id))
        .transpose()?;
    let nodes = db.list_taxonomy_children(parent_id)?;
    if json {
        return print_json(&nodes);
    }
    if nodes.is_empty() {
        eprintln!("No child nodes");
        return Ok(());
    }
    let refs: Vec<_> = nodes.iter().collect();
    print_node_table(&refs);
    Ok(())
}

pub(crate) fn cmd_taxonomy_staple(db: &Database, food: &str, on: bool, json: bool) -> Result<()> {
    let node = resolve_node(db, food)?;
    let node = db
        .set_pantry_staple(node.id, on)
        .context("Failed to update staple flag")?;
    if json {
        print_json(&node)?;
    } else if on {
        println!("'{}' is now a pantry staple", node.name);
    } else {
        println!("'{}' is no longer a pantry staple", node.name);
    }
    Ok(())
}
