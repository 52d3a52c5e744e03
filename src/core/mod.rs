pub mod config;
pub mod forecast;
pub mod formatter;
pub mod ledger;
pub mod logs;
pub mod models;
pub mod notify;
pub mod providers;
