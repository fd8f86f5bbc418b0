/// Database module for the trade plan cache
///
/// This module provides:
/// - A PostgreSQL connection pool with embedded migrations
/// - Repository traits and their diesel implementations
/// - An in-memory store implementing the same traits
/// - Database models and schema

pub mod connection;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod schema;

pub use connection::{establish_connection_pool, DatabaseError, DatabasePool};
pub use memory::{InMemoryStore, InMemoryStoreStats};
