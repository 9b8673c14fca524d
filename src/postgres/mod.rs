// ABOUTME: PostgreSQL utilities module
// ABOUTME: Exports connection management for source and target databases

pub mod connection;

pub use connection::{connect, connect_with_retry};
