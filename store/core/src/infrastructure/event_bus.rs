// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Store and Component Events
//
// Provides in-process event streaming using tokio broadcast channels.
// The store publishes StateEvents after every commit and maintenance pass,
// and consumes ComponentEvents published by external components.
//
// In-memory only: events published with no subscribers are dropped.

use crate::domain::events::{ComponentEvent, StateEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    State(StateEvent),
    Component(ComponentEvent),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::State(event) => event.event_type(),
            DomainEvent::Component(event) => event.event_type(),
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before the
    /// slowest receiver starts lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_state_event(&self, event: StateEvent) {
        self.publish(DomainEvent::State(event));
    }

    pub fn publish_component_event(&self, event: ComponentEvent) {
        self.publish(DomainEvent::Component(event));
    }

    /// Publish a domain event to all subscribers
    fn publish(&self, event: DomainEvent) {
        debug!(event_type = event.event_type(), "Publishing event");

        // send() only fails when nobody is listening
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to store-published events only
    pub fn subscribe_state(&self) -> StateEventReceiver {
        StateEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to [`StateEvent`]s
pub struct StateEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl StateEventReceiver {
    pub async fn recv(&mut self) -> Result<StateEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::State(state_event) = event {
                return Ok(state_event);
            }
        }
    }

    /// Drain whatever is buffered right now, skipping component events
    pub fn try_recv(&mut self) -> Result<StateEvent, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(DomainEvent::State(state_event)) => return Ok(state_event),
                Ok(DomainEvent::Component(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return Err(EventBusError::Empty),
                Err(broadcast::error::TryRecvError::Closed) => return Err(EventBusError::Closed),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Event receiver lagged by {} events", n);
                    return Err(EventBusError::Lagged(n));
                }
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
