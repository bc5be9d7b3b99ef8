//! In-process domain events.
//!
//! A [`DomainEvent`] is raised by the owning service after a successful
//! domain action and fanned out by the [`EventDispatcher`] to every
//! [`EventHandler`] registered under its name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bus::BusError;

pub mod dispatcher;
pub mod handlers;

pub use dispatcher::{
    DispatchError, DispatchMode, EventDispatcher, EventDispatcherBuilder, HandlerFailure,
    RegistrationError,
};
pub use handlers::{LogOnlyHandler, PublishingHandler};

/// Event raised when a person record is created or updated.
pub const PESSOA_SAVED: &str = "pessoa.saved";
/// Event raised when a person record is deleted.
pub const PESSOA_DELETED: &str = "pessoa.deleted";

/// Errors returned by event handlers.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Failed to serialize event payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish event: {0}")]
    Publish(#[from] BusError),

    #[error("{0}")]
    Handler(String),
}

/// A named, immutable domain event with a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    name: String,
    occurred_at: DateTime<Utc>,
    key: Option<String>,
    payload: serde_json::Value,
}

impl DomainEvent {
    /// Serialize `payload` into a new event stamped with the current time.
    pub fn new<T: Serialize>(name: impl Into<String>, payload: &T) -> Result<Self, EventError> {
        Ok(Self::from_value(name, serde_json::to_value(payload)?))
    }

    pub fn from_value(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            occurred_at: Utc::now(),
            key: None,
            payload,
        }
    }

    /// Message key used when the event is externalized.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }
}

/// Reacts to a dispatched domain event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and dispatch errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), EventError>;
}
