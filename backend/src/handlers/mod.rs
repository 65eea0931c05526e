//! HTTP request handlers

pub mod health;
pub mod ledger;
pub mod query;
pub mod reporting;
pub mod sales;
pub mod supplies;

pub use health::health_check;
pub use ledger::rebuild_ledger;
pub use reporting::get_report;
pub use sales::{create_sale, delete_sale, get_sale, list_sales, patch_sale, update_sale};
pub use supplies::{
    create_supply, delete_supply, get_supply, list_supplies, patch_supply, update_supply,
};
