//! Publish/subscribe channel for lifecycle events.

pub mod in_memory;

pub use in_memory::InMemoryEventBus;

use async_trait::async_trait;
use ctrlplane_core::{Event, EventType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventBusError {
    #[error("event bus is closed")]
    Closed,
    #[error("event handler failed: {0}")]
    Handler(String),
}

pub type EventBusResult<T> = std::result::Result<T, EventBusError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiver side of a subscription
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> EventBusResult<()>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: Event) -> EventBusResult<()>;

    /// Subscribe `handler` to `event_types`; an empty list subscribes to all
    async fn subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        event_types: Vec<EventType>,
    ) -> EventBusResult<SubscriptionId>;

    /// Returns false when the subscription was not found
    async fn unsubscribe(&self, id: SubscriptionId) -> bool;

    /// Drop every subscription and refuse further publishes
    async fn close(&self);
}
