//! Real-time event plumbing for the dispatch engine.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`DomainEvent`]: one committed transition or update, with the
//!   audiences it is addressed to.
//! - [`Transport`]: the collaborator that reaches connected users.
//! - [`LivenessListener`]: told when a send to a user fails.
//! - [`EventFanout`]: background loop moving bus events to the transport.

pub mod bus;
pub mod fanout;
pub mod transport;

pub use bus::{Audience, DomainEvent, EventBus};
pub use fanout::EventFanout;
pub use transport::{LivenessListener, Transport};
