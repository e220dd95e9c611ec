//! This module aggregates various utility submodules used throughout the application.

/// Typed settings read from the environment.
pub mod config;
/// Statistics and DM log stored in SQLite.
pub mod database;
