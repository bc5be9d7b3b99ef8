//! Consumer-side replication of foreign-service records.
//!
//! A [`ReplicationHandler`] decodes an inbound message into a DTO and hands it
//! to [`SaveReplicaUseCase`], which performs an idempotent upsert against a
//! [`ReplicaRepository`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::storage::{Result, StorageError};

mod handler;
pub mod person;

pub use handler::ReplicationHandler;
pub use person::{PersonDto, PersonRecord};

/// Inbound DTO keyed by the owning service's natural identifier.
pub trait ReplicaDto: DeserializeOwned + Send + Sync {
    fn identifier(&self) -> &str;

    /// Version timestamp from the owner, when it sends one.
    fn version(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// A stored replica row.
pub trait ReplicaRecord<D>: Send + Sync {
    fn version(&self) -> Option<DateTime<Utc>>;

    /// True when applying `dto` would not change this record.
    fn reflects(&self, dto: &D) -> bool;
}

/// Local persistence for replicated records.
#[async_trait]
pub trait ReplicaRepository<D: ReplicaDto>: Send + Sync {
    type Record: ReplicaRecord<D>;

    /// Insert, or overwrite the record with the same identifier.
    ///
    /// The version check and the write are one atomic step: returns `None`,
    /// writing nothing, when the stored record carries a newer version.
    async fn create_or_update(&self, dto: &D) -> Result<Option<Self::Record>>;

    async fn find_by_identifier(&self, id: &str) -> Result<Option<Self::Record>>;
}

/// True when a stored version is newer than the incoming one.
/// Unversioned records on either side never make a message stale.
pub fn is_stale(stored: Option<DateTime<Utc>>, incoming: Option<DateTime<Utc>>) -> bool {
    matches!((stored, incoming), (Some(stored), Some(incoming)) if stored > incoming)
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// The stored record already reflected the DTO.
    Unchanged,
    /// The stored record carries a newer version.
    Stale,
}

impl std::fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Stale => "stale",
        };
        f.write_str(name)
    }
}

/// Applies one inbound DTO to the replica.
pub struct SaveReplicaUseCase<R> {
    repository: Arc<R>,
}

impl<R> SaveReplicaUseCase<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Upsert `dto` unless the replica already holds it or something newer.
    ///
    /// Without version timestamps this is last-write-wins in delivery order.
    pub async fn execute_create_or_update<D>(&self, dto: D) -> Result<UpsertOutcome>
    where
        D: ReplicaDto,
        R: ReplicaRepository<D>,
    {
        let id = dto.identifier();
        if id.trim().is_empty() {
            return Err(StorageError::InvalidRecord("identifier must not be empty".to_string()));
        }

        // The lookup only classifies; staleness is settled by the write itself,
        // since another loop may write the same identifier in between.
        let outcome = match self.repository.find_by_identifier(id).await? {
            None => self.write(&dto, UpsertOutcome::Created).await?,
            Some(current) if is_stale(current.version(), dto.version()) => UpsertOutcome::Stale,
            Some(current) if current.reflects(&dto) => UpsertOutcome::Unchanged,
            Some(_) => self.write(&dto, UpsertOutcome::Updated).await?,
        };

        debug!(id = %id, outcome = %outcome, "Replica upsert");
        Ok(outcome)
    }

    async fn write<D>(&self, dto: &D, applied: UpsertOutcome) -> Result<UpsertOutcome>
    where
        D: ReplicaDto,
        R: ReplicaRepository<D>,
    {
        Ok(match self.repository.create_or_update(dto).await? {
            Some(_) => applied,
            None => UpsertOutcome::Stale,
        })
    }
}

#[cfg(test)]
mod tests;
