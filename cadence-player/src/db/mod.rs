//! Database access layer
//!
//! Provides database queries for settings, the play queue snapshot and the
//! download ledger.

pub mod init;
pub mod library;
pub mod queue;
pub mod settings;

pub use init::{create_schema, init_settings_defaults, open_database, open_in_memory};
