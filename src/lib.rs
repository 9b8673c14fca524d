// ABOUTME: Library module for postgres-constraint-cloner
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod commands;
pub mod engine;
pub mod error;
pub mod postgres;
pub mod schema;
pub mod utils;
