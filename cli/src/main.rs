mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    RecipeArgs, cmd_config_set, cmd_config_show, cmd_config_unset, cmd_cook, cmd_household_create,
    cmd_household_join, cmd_household_leave, cmd_inventory_add, cmd_inventory_expiring,
    cmd_inventory_list, cmd_inventory_remove, cmd_inventory_set, cmd_recipe_add_ingredient,
    cmd_recipe_create, cmd_recipe_delete, cmd_recipe_import, cmd_recipe_list, cmd_recipe_publish,
    cmd_recipe_remove_ingredient, cmd_recipe_show, cmd_search, cmd_stats, cmd_sub_add,
    cmd_sub_list, cmd_sub_remove, cmd_taxonomy_add, cmd_taxonomy_children, cmd_taxonomy_search,
    cmd_taxonomy_show, cmd_taxonomy_staple, cmd_user_add, cmd_user_list,
};
use crate::config::Config;
use larder_core::db::Database;
use larder_core::models::SearchOptions;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "What can I cook with what I have?",
    long_about = "Track your pantry against a food taxonomy and rank recipes by how much of \
                  each one you can already cover."
)]
struct Cli {
    /// Acting user id (household members share one pantry)
    #[arg(short, long, global = true, default_value = "1")]
    user: i64,
    /// More log output on stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank recipes by how much of each one your pantry covers
    Search {
        /// Only recipes whose title contains this text
        query: Option<String>,
        /// Maximum number of missing ingredients (default: 5 or the saved setting)
        #[arg(short, long)]
        max_missing: Option<usize>,
        /// Exact cuisine (case-insensitive)
        #[arg(long)]
        cuisine: Option<String>,
        /// Exact difficulty (case-insensitive)
        #[arg(long)]
        difficulty: Option<String>,
        /// Do not assume pantry staples are in stock
        #[arg(long)]
        no_staples: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Count recipes that are ready, almost ready, or need shopping
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a recipe as cooked and deduct its ingredients from inventory
    Cook {
        /// Recipe ID
        recipe_id: i64,
        /// Servings multiplier applied to every ingredient quantity
        #[arg(short, long, default_value = "1")]
        servings: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the food taxonomy
    Taxonomy {
        #[command(subcommand)]
        command: TaxonomyCommands,
    },
    /// Manage what is in the pantry, fridge and freezer
    Inventory {
        #[command(subcommand)]
        command: InventoryCommands,
    },
    /// Manage ingredient substitutions
    Sub {
        #[command(subcommand)]
        command: SubCommands,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage households (shared pantries)
    Household {
        #[command(subcommand)]
        command: HouseholdCommands,
    },
    /// Show or change saved search defaults
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum TaxonomyCommands {
    /// Add a category, generic food or branded product
    Add {
        /// Node name
        name: String,
        /// Kind: category, generic_food, branded_product
        #[arg(short, long, default_value = "generic_food")]
        kind: String,
        /// Parent node (id or name)
        #[arg(short, long)]
        parent: Option<String>,
        /// Mark as a pantry staple
        #[arg(long)]
        staple: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a node and everything below it
    Show {
        /// Node id or name
        food: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Search nodes by name
    Search {
        /// Search text
        query: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List direct children of a node (roots when omitted)
    Children {
        /// Parent node id or name
        parent: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a node as a pantry staple
    Staple {
        /// Node id or name
        food: String,
        /// Clear the staple flag instead
        #[arg(long)]
        off: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum InventoryCommands {
    /// Add stock
    Add {
        /// Food (taxonomy id or name)
        food: String,
        /// Quantity (e.g. "6", "500g", "2 l")
        quantity: String,
        /// Unit, when not part of the quantity (default: pcs)
        #[arg(long)]
        unit: Option<String>,
        /// Storage location: pantry, fridge, freezer, other
        #[arg(short, long, default_value = "pantry")]
        location: String,
        /// Expiration date (YYYY-MM-DD, today/tomorrow, or +N days)
        #[arg(short, long)]
        expires: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stock, soonest expiring first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stock expiring within N days
    Expiring {
        /// Number of days to look ahead
        #[arg(short, long, default_value = "3")]
        days: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the quantity of a stock record
    Set {
        /// Inventory record ID
        id: i64,
        /// New quantity
        quantity: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a stock record
    Remove {
        /// Inventory record ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SubCommands {
    /// Allow one food to stand in for another
    Add {
        /// Food the recipe asks for
        required: String,
        /// Food that can replace it
        substitute: String,
        /// Match quality: exact, close, generic
        #[arg(short, long, default_value = "close")]
        r#match: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List substitutions
    List {
        /// Only substitutions for this food
        required: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a substitution
    Remove {
        /// Food the recipe asks for
        required: String,
        /// Food that replaced it
        substitute: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new recipe
    Create {
        /// Recipe title
        title: String,
        /// Cuisine (e.g. Italian)
        #[arg(long)]
        cuisine: Option<String>,
        /// Difficulty (e.g. easy)
        #[arg(long)]
        difficulty: Option<String>,
        /// Preparation time in minutes
        #[arg(long)]
        prep: Option<i64>,
        /// Cooking time in minutes
        #[arg(long)]
        cook: Option<i64>,
        /// Number of servings this recipe makes
        #[arg(short, long, default_value = "1")]
        servings: f64,
        /// Keep the recipe out of search results
        #[arg(long)]
        private: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient line to a recipe
    AddIngredient {
        /// Recipe id or title
        recipe: String,
        /// Ingredient (taxonomy id or name; free text with --unlinked)
        ingredient: String,
        /// Quantity (e.g. "200g", "2", "1 cup")
        quantity: Option<String>,
        /// Keep the line as free text, not linked to the taxonomy
        #[arg(long)]
        unlinked: bool,
        /// The ingredient is optional
        #[arg(long)]
        optional: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient line from a recipe
    RemoveIngredient {
        /// Recipe id or title
        recipe: String,
        /// Ingredient line name to remove
        ingredient: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recipe details
    Show {
        /// Recipe id or title
        recipe: String,
        /// Explain how the pantry covers each ingredient
        #[arg(long)]
        coverage: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Include private recipes
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make a recipe visible to search
    Publish {
        /// Recipe id or title
        recipe: String,
        /// Make it private instead
        #[arg(long)]
        private: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe id or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: std::path::PathBuf,
        /// Title override (defaults to metadata title or filename)
        #[arg(long)]
        title: Option<String>,
        /// Servings override (defaults to metadata servings)
        #[arg(long)]
        servings: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Add {
        /// Display name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List users
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum HouseholdCommands {
    /// Create a household
    Create {
        /// Household name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add the acting user (--user) to a household
    Join {
        /// Household ID
        household_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the acting user (--user) from their household
    Leave {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show saved search defaults
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a default: default_max_missing, assume_pantry_staples
    Set {
        /// Setting name
        key: String,
        /// Value
        value: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Reset a setting to its built-in default
    Unset {
        /// Setting name
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;
    let user = cli.user;

    match cli.command {
        Commands::Search {
            query,
            max_missing,
            cuisine,
            difficulty,
            no_staples,
            json,
        } => {
            let options = SearchOptions {
                max_missing,
                cuisine,
                difficulty,
                query,
                assume_pantry_staples: no_staples.then_some(false),
            };
            cmd_search(&db, user, &options, json)
        }
        Commands::Stats { json } => cmd_stats(&db, user, json),
        Commands::Cook {
            recipe_id,
            servings,
            json,
        } => cmd_cook(&db, user, recipe_id, servings, json),
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            server::start_server(db, port, &bind, api_key).await
        }
        Commands::Taxonomy { command } => match command {
            TaxonomyCommands::Add {
                name,
                kind,
                parent,
                staple,
                json,
            } => cmd_taxonomy_add(&db, &name, &kind, parent.as_deref(), staple, json),
            TaxonomyCommands::Show { food, json } => cmd_taxonomy_show(&db, &food, json),
            TaxonomyCommands::Search { query, json } => cmd_taxonomy_search(&db, &query, json),
            TaxonomyCommands::Children { parent, json } => {
                cmd_taxonomy_children(&db, parent.as_deref(), json)
            }
            TaxonomyCommands::Staple { food, off, json } => {
                cmd_taxonomy_staple(&db, &food, !off, json)
            }
        },
        Commands::Inventory { command } => match command {
            InventoryCommands::Add {
                food,
                quantity,
                unit,
                location,
                expires,
                json,
            } => cmd_inventory_add(&db, user, &food, &quantity, unit, &location, expires, json),
            InventoryCommands::List { json } => cmd_inventory_list(&db, user, json),
            InventoryCommands::Expiring { days, json } => {
                cmd_inventory_expiring(&db, user, days, json)
            }
            InventoryCommands::Set { id, quantity, json } => {
                cmd_inventory_set(&db, id, &quantity, json)
            }
            InventoryCommands::Remove { id, json } => cmd_inventory_remove(&db, id, json),
        },
        Commands::Sub { command } => match command {
            SubCommands::Add {
                required,
                substitute,
                r#match,
                json,
            } => cmd_sub_add(&db, &required, &substitute, &r#match, json),
            SubCommands::List { required, json } => cmd_sub_list(&db, required.as_deref(), json),
            SubCommands::Remove {
                required,
                substitute,
                json,
            } => cmd_sub_remove(&db, &required, &substitute, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                title,
                cuisine,
                difficulty,
                prep,
                cook,
                servings,
                private,
                json,
            } => cmd_recipe_create(
                &db,
                RecipeArgs {
                    title,
                    cuisine,
                    difficulty,
                    prep_minutes: prep,
                    cook_minutes: cook,
                    servings,
                    private,
                },
                json,
            ),
            RecipeCommands::AddIngredient {
                recipe,
                ingredient,
                quantity,
                unlinked,
                optional,
                json,
            } => cmd_recipe_add_ingredient(
                &db,
                &recipe,
                &ingredient,
                quantity.as_deref(),
                unlinked,
                optional,
                json,
            ),
            RecipeCommands::RemoveIngredient {
                recipe,
                ingredient,
                json,
            } => cmd_recipe_remove_ingredient(&db, &recipe, &ingredient, json),
            RecipeCommands::Show {
                recipe,
                coverage,
                json,
            } => cmd_recipe_show(&db, user, &recipe, coverage, json),
            RecipeCommands::List { all, json } => cmd_recipe_list(&db, all, json),
            RecipeCommands::Publish {
                recipe,
                private,
                json,
            } => cmd_recipe_publish(&db, &recipe, !private, json),
            RecipeCommands::Delete { recipe, json } => cmd_recipe_delete(&db, &recipe, json),
            RecipeCommands::Import {
                file,
                title,
                servings,
                json,
            } => cmd_recipe_import(&db, &file, title, servings, json),
        },
        Commands::User { command } => match command {
            UserCommands::Add { name, json } => cmd_user_add(&db, &name, json),
            UserCommands::List { json } => cmd_user_list(&db, json),
        },
        Commands::Household { command } => match command {
            HouseholdCommands::Create { name, json } => cmd_household_create(&db, &name, json),
            HouseholdCommands::Join { household_id, json } => {
                cmd_household_join(&db, user, household_id, json)
            }
            HouseholdCommands::Leave { json } => cmd_household_leave(&db, user, json),
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { json } => cmd_config_show(&db, json),
            ConfigCommands::Set { key, value, json } => cmd_config_set(&db, &key, &value, json),
            ConfigCommands::Unset { key, json } => cmd_config_unset(&db, &key, json),
        },
    }
}
