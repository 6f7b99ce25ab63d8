//! Event types for the Folio event system
//!
//! The EventBus carries pipeline events to in-process subscribers; the
//! distributor forwards `DocumentIngested` to the downstream output
//! exchange.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Target of a full index rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexTarget {
    Current,
    History,
}

impl std::fmt::Display for ReindexTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReindexTarget::Current => write!(f, "current"),
            ReindexTarget::History => write!(f, "history"),
        }
    }
}

/// Folio pipeline events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FolioEvent {
    /// An entity's current document was recomputed and stored.
    ///
    /// Published to the distributor output exchange so downstream consumers
    /// can react without polling.
    DocumentIngested {
        entity_id: Uuid,
        schema: String,
        /// Upstream system that triggered the recompute.
        system: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The fire-and-forget index push failed; the ingest itself succeeded.
    IndexPushFailed {
        entity_id: Uuid,
        schema: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A full rebuild started.
    ReindexStarted {
        target: ReindexTarget,
        timestamp: DateTime<Utc>,
    },

    /// A full rebuild finished.
    ReindexCompleted {
        target: ReindexTarget,
        documents: usize,
        timestamp: DateTime<Utc>,
    },

    /// A message was routed to the dead-letter exchange.
    MessageDeadLettered {
        content_type: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// Central event distribution bus.
///
/// Backed by `tokio::broadcast`: non-blocking publish, any number of
/// subscribers, lagged-receiver detection for slow consumers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FolioEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FolioEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the subscriber count, or an error when nobody is listening.
    /// Emission failure is never fatal to the pipeline.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FolioEvent,
    ) -> Result<usize, broadcast::error::SendError<FolioEvent>> {
        self.tx.send(event)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
