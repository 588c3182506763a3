pub mod coverage;
pub mod db;
pub mod deduction;
pub mod inventory;
pub mod models;
pub mod ranking;
pub mod service;
pub mod store;
pub mod substitution;
pub mod taxonomy;
