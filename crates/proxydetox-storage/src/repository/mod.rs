//! Repository layer for database operations.

mod config;

pub use config::ConfigRepo;
