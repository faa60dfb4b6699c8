use tokio::sync::RwLock;

use raterbot_core::domain::lead::LeadRecord;

use super::{LeadRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<Vec<LeadRecord>>,
}

impl InMemoryLeadRepository {
    pub async fn all(&self) -> Vec<LeadRecord> {
        self.leads.read().await.clone()
    }
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn append(&self, lead: LeadRecord) -> Result<(), RepositoryError> {
        self.leads.write().await.push(lead);
        Ok(())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<LeadRecord>, RepositoryError> {
        let leads = self.leads.read().await;
        let mut recent: Vec<_> = leads.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit as usize);
        Ok(recent)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        Ok(self.leads.read().await.len() as u64)
    }
}
