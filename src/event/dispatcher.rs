//! Event name -> handler fan-out.
//!
//! Registration happens on an [`EventDispatcherBuilder`] during startup;
//! `build()` seals it into an immutable [`EventDispatcher`] that request
//! paths share without locking.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, warn};

use super::{DomainEvent, EventError, EventHandler};

/// What `dispatch` does when a handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Stop at the first failing handler.
    FailFast,
    /// Run every handler, then report all failures together.
    #[default]
    ContinueAndCollect,
}

/// Errors raised while registering handlers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Handler '{handler}' is already registered for '{event}'")]
    AlreadyRegistered { event: String, handler: String },

    #[error("Event name must not be empty")]
    EmptyEventName,
}

/// One failed handler within a dispatch.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: EventError,
}

/// Errors returned by [`EventDispatcher::dispatch`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Handler '{handler}' failed for '{event}': {source}")]
    Halted {
        event: String,
        handler: String,
        #[source]
        source: EventError,
    },

    #[error("{} handler(s) failed for '{event}'", .failures.len())]
    Handlers {
        event: String,
        failures: Vec<HandlerFailure>,
    },
}

type Registry = HashMap<String, Vec<Arc<dyn EventHandler>>>;

fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Mutable registration phase of the dispatcher.
#[derive(Default)]
pub struct EventDispatcherBuilder {
    handlers: Registry,
    mode: DispatchMode,
}

impl EventDispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append `handler` to the handlers for `event`.
    ///
    /// Insertion order is invocation order.
    pub fn register(
        &mut self,
        event: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<&mut Self, RegistrationError> {
        let event = event.into();
        if event.trim().is_empty() {
            return Err(RegistrationError::EmptyEventName);
        }

        let registered = self.handlers.entry(event.clone()).or_default();
        if registered.iter().any(|h| same_handler(h, &handler)) {
            return Err(RegistrationError::AlreadyRegistered {
                event,
                handler: handler.name().to_string(),
            });
        }

        debug!(event = %event, handler = %handler.name(), "Handler registered");
        registered.push(handler);
        Ok(self)
    }

    /// Remove `handler` from `event`. Returns whether it was registered.
    pub fn remove(&mut self, event: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let Some(registered) = self.handlers.get_mut(event) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|h| !same_handler(h, handler));
        let removed = registered.len() != before;
        if registered.is_empty() {
            self.handlers.remove(event);
        }
        removed
    }

    pub fn has(&self, event: &str, handler: &Arc<dyn EventHandler>) -> bool {
        self.handlers
            .get(event)
            .is_some_and(|registered| registered.iter().any(|h| same_handler(h, handler)))
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Seal the registrations.
    pub fn build(self) -> EventDispatcher {
        EventDispatcher {
            handlers: Arc::new(self.handlers),
            mode: self.mode,
        }
    }
}

/// Sealed, shareable dispatcher.
#[derive(Clone)]
pub struct EventDispatcher {
    handlers: Arc<Registry>,
    mode: DispatchMode,
}

impl EventDispatcher {
    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::new()
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.get(event).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for `event.name()`, in order.
    ///
    /// No registered handlers is a no-op.
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<(), DispatchError> {
        let Some(registered) = self.handlers.get(event.name()) else {
            debug!(event = %event.name(), "No handlers registered");
            return Ok(());
        };

        let mut failures = Vec::new();

        for handler in registered {
            let Err(e) = handler.handle(event).await else {
                continue;
            };

            match self.mode {
                DispatchMode::FailFast => {
                    error!(event = %event.name(), handler = %handler.name(), error = %e, "Handler failed, halting dispatch");
                    return Err(DispatchError::Halted {
                        event: event.name().to_string(),
                        handler: handler.name().to_string(),
                        source: e,
                    });
                }
                DispatchMode::ContinueAndCollect => {
                    warn!(event = %event.name(), handler = %handler.name(), error = %e, "Handler failed");
                    failures.push(HandlerFailure {
                        handler: handler.name().to_string(),
                        error: e,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Handlers {
                event: event.name().to_string(),
                failures,
            })
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut events: Vec<_> = self.handlers.keys().collect();
        events.sort();
        f.debug_struct("EventDispatcher")
            .field("events", &events)
            .field("mode", &self.mode)
            .finish()
    }
}
