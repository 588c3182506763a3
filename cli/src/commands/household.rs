use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use larder_core::db::Database;

use super::helpers::print_json;

pub(crate) fn cmd_user_add(db: &Database, name: &str, json: bool) -> Result<()> {
    let user = db.create_user(name)?;
    if json {
        print_json(&user)?;
    } else {
        println!("Created user: {} (id: {})", user.name, user.id);
    }
    Ok(())
}

pub(crate) fn cmd_user_list(db: &Database, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct UserRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Household")]
        household: String,
    }

    let users = db.list_users()?;
    if json {
        return print_json(&users);
    }
    if users.is_empty() {
        eprintln!("No users yet. Create one with: larder user add <name>");
        return Ok(());
    }
    let rows: Vec<UserRow> = users
        .iter()
        .map(|u| UserRow {
            id: u.id,
            name: u.name.clone(),
            household: u.household_id.map(|h| h.to_string()).unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}

pub(crate) fn cmd_household_create(db: &Database, name: &str, json: bool) -> Result<()> {
    let household = db.create_household(name)?;
    if json {
        print_json(&household)?;
    } else {
        println!("Created household: {} (id: {})", household.name, household.id);
    }
    Ok(())
}

pub(crate) fn cmd_household_join(
    db: &Database,
    user_id: i64,
    household_id: i64,
    json: bool,
) -> Result<()> {
    db.join_household(user_id, household_id)?;
    if json {
        print_json(&db.get_user(user_id)?)?;
    } else {
        println!("User {user_id} now shares the pantry of household {household_id}");
    }
    Ok(())
}

pub(crate) fn cmd_household_leave(db: &Database, user_id: i64, json: bool) -> Result<()> {
    let left = db.leave_household(user_id)?;
    if json {
        println!("{}", serde_json::json!({ "left": left }));
    } else if left {
        println!("User {user_id} left their household");
    } else {
        println!("User {user_id} is not in a household");
    }
    Ok(())
}
