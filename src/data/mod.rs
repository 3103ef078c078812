//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations
//! - User and provider identity models

mod database;
mod models;

pub use database::{Database, LinkOutcome};
pub use models::*;

#[cfg(test)]
mod database_test;
