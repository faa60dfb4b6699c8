use async_trait::async_trait;
use thiserror::Error;

use raterbot_core::domain::lead::LeadRecord;

pub mod lead;
pub mod memory;

pub use lead::SqlLeadRepository;
pub use memory::InMemoryLeadRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Append-only log of delivered quotes.
#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn append(&self, lead: LeadRecord) -> Result<(), RepositoryError>;
    async fn list_recent(&self, limit: u32) -> Result<Vec<LeadRecord>, RepositoryError>;
    async fn count(&self) -> Result<u64, RepositoryError>;
}
