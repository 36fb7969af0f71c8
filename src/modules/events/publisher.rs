use tokio::sync::broadcast;
use tracing::{debug, info};

use super::domain_event::DomainEvent;

/// Sink for committed domain events
///
/// `publish` must not block and must not fail the caller; delivery is best-effort.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);

    fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

/// Writes every event to the structured log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: DomainEvent) {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(
                event = event.name(),
                tenant_id = %event.tenant_id(),
                payload = %payload,
                "Domain event"
            ),
            Err(e) => info!(event = event.name(), error = %e, "Domain event (unserializable)"),
        }
    }
}

/// Fans events out to in-process subscribers; events with no subscriber are dropped
#[derive(Debug, Clone)]
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for BroadcastEventPublisher {
    fn publish(&self, event: DomainEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            debug!(event = name, "No subscribers for domain event");
        }
    }
}
