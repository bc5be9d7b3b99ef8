//! Consumer message handler that feeds the replica.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{ReplicaDto, ReplicaRepository, SaveReplicaUseCase};
use crate::bus::{HandlerError, Message, MessageHandler};

/// Decodes `D` from the message value and upserts it into `R`.
pub struct ReplicationHandler<D, R> {
    repository: Arc<R>,
    _dto: PhantomData<fn() -> D>,
}

impl<D, R> ReplicationHandler<D, R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            _dto: PhantomData,
        }
    }
}

#[async_trait]
impl<D, R> MessageHandler for ReplicationHandler<D, R>
where
    D: ReplicaDto + 'static,
    R: ReplicaRepository<D> + 'static,
{
    async fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        // Malformed payloads never reach the repository.
        let dto: D = serde_json::from_slice(&message.value)?;
        let id = dto.identifier().to_string();

        let outcome = SaveReplicaUseCase::new(self.repository.clone())
            .execute_create_or_update(dto)
            .await?;

        info!(
            topic = %message.topic,
            offset = message.offset,
            id = %id,
            outcome = %outcome,
            "Replica updated"
        );
        Ok(())
    }
}
