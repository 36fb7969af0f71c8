//! Domain events published after commit for audit and notification subscribers

pub mod domain_event;
pub mod publisher;

pub use domain_event::DomainEvent;
pub use publisher::{BroadcastEventPublisher, EventPublisher, TracingEventPublisher};
