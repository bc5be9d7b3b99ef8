//! In-memory replica repository.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Result;
use crate::replication::{is_stale, PersonDto, PersonRecord, ReplicaRepository};

/// People replica held in a map. Used for standalone mode and tests.
#[derive(Default)]
pub struct InMemoryPersonRepository {
    records: RwLock<HashMap<String, PersonRecord>>,
}

impl InMemoryPersonRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ReplicaRepository<PersonDto> for InMemoryPersonRepository {
    type Record = PersonRecord;

    async fn create_or_update(&self, dto: &PersonDto) -> Result<Option<PersonRecord>> {
        let mut records = self.records.write().await;
        if let Some(current) = records.get(&dto.id) {
            if is_stale(current.updated_at, dto.updated_at) {
                return Ok(None);
            }
        }
        let record = PersonRecord::from(dto);
        records.insert(record.id.clone(), record.clone());
        Ok(Some(record))
    }

    async fn find_by_identifier(&self, id: &str) -> Result<Option<PersonRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }
}
