//! SQLite persistence: connection pool, embedded migrations and the lead log.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryLeadRepository, LeadRepository, RepositoryError, SqlLeadRepository,
};
