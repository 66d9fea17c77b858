// SPDX-License-Identifier: GPL-3.0-or-later
//! Outbound notifications for grabs, imports and queue removals.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use mediarr_domain::{DomainEvent, EventPayload, EventTopic};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub trait EventPublisher: Send + Sync {
    fn publish<P: EventPayload>(&self, event: &DomainEvent<P>);
}

/// A published event with its payload already serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub topic: EventTopic,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Keeps every published event in memory, in publish order.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    inner: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn events(&self) -> std::sync::MutexGuard<'_, Vec<RecordedEvent>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!(target: "events", "event bus mutex poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, topic: EventTopic) -> usize {
        self.events().iter().filter(|event| event.topic == topic).count()
    }

    /// Payloads published under `P`'s topic. Ones that no longer decode are skipped.
    pub fn payloads<P: EventPayload + DeserializeOwned>(&self) -> Vec<P> {
        self.events()
            .iter()
            .filter(|event| event.topic == P::TOPIC)
            .filter_map(|event| serde_json::from_value(event.payload.clone()).ok())
            .collect()
    }

    pub fn drain(&self) -> Vec<RecordedEvent> {
        std::mem::take(&mut *self.events())
    }
}

impl EventPublisher for InMemoryEventBus {
    fn publish<P: EventPayload>(&self, event: &DomainEvent<P>) {
        let payload = match serde_json::to_value(&event.payload) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: "events", topic = %event.topic, %err, "dropping unserializable event");
                return;
            }
        };
        debug!(target: "events", topic = %event.topic, "event published");
        self.events().push(RecordedEvent {
            topic: event.topic,
            occurred_at: event.occurred_at,
            payload,
        });
    }
}
