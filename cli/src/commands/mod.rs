mod helpers;
mod household;
mod inventory;
mod recipe;
mod search;
mod settings;
mod substitution;
mod taxonomy;

pub(crate) use household::{
    cmd_household_create, cmd_household_join, cmd_household_leave, cmd_user_add, cmd_user_list,
};
pub(crate) use inventory::{
    cmd_inventory_add, cmd_inventory_expiring, cmd_inventory_list, cmd_inventory_remove,
    cmd_inventory_set,
};
pub(crate) use recipe::{
    RecipeArgs, cmd_recipe_add_ingredient, cmd_recipe_create, cmd_recipe_delete,
    cmd_recipe_import, cmd_recipe_list, cmd_recipe_publish, cmd_recipe_remove_ingredient,
    cmd_recipe_show,
};
pub(crate) use search::{cmd_cook, cmd_search, cmd_stats};
pub(crate) use settings::{cmd_config_set, cmd_config_show, cmd_config_unset};
pub(crate) use substitution::{cmd_sub_add, cmd_sub_list, cmd_sub_remove};
pub(crate) use taxonomy::{
    cmd_taxonomy_add, cmd_taxonomy_children, cmd_taxonomy_search, cmd_taxonomy_show,
    cmd_taxonomy_staple,
};
