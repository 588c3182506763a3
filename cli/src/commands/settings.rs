use anyhow::Result;

use larder_core::db::Database;
use larder_core::models::{SETTING_DEFAULT_MAX_MISSING, SETTING_KEYS};

use super::helpers::print_json;

pub(crate) fn cmd_config_set(db: &Database, key: &str, value: &str, json: bool) -> Result<()> {
    let value = db.update_setting(key, value)?;
    if json {
        let mut map = serde_json::Map::new();
        map.insert(key.to_string(), serde_json::Value::String(value));
        println!("{}", serde_json::Value::Object(map));
    } else {
        println!("{key} = {value}");
    }
    Ok(())
}

pub(crate) fn cmd_config_unset(db: &Database, key: &str, json: bool) -> Result<()> {
    let removed = db.delete_setting(key)?;
    if json {
        println!("{}", serde_json::json!({ "removed": removed }));
    } else if removed {
        println!("{key} reset to its default");
    } else {
        println!("{key} was not set");
    }
    Ok(())
}

pub(crate) fn cmd_config_show(db: &Database, json: bool) -> Result<()> {
    let defaults = db.search_defaults()?;
    if json {
        return print_json(&defaults);
    }
    for key in SETTING_KEYS {
        let stored = db.get_setting(key)?;
        let source = if stored.is_some() { "" } else { " (default)" };
        let value = match *key {
            SETTING_DEFAULT_MAX_MISSING => defaults.max_missing.to_string(),
            _ => defaults.assume_pantry_staples.to_string(),
        };
        println!("{key} = {value}{source}");
    }
    Ok(())
}
