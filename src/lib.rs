//! Usage forecasting for rotating AI CLI profiles.
//!
//! `core` holds the session ledger, burn-rate calculator, prediction engine
//! and alert generator; `cli` is the `ait` front end built on them.

pub mod cli;
pub mod core;
