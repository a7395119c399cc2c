//! Bus-to-transport delivery loop.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::bus::DomainEvent;
use crate::transport::{LivenessListener, Transport};

/// Background service that forwards every bus event to the transport.
pub struct EventFanout;

impl EventFanout {
    /// Run the fan-out loop until the bus is dropped.
    ///
    /// Failed sends never hold up delivery of later events: each affected
    /// user is handed to `listener` on its own task.
    pub async fn run(
        transport: Arc<dyn Transport>,
        listener: Option<Arc<dyn LivenessListener>>,
        mut receiver: broadcast::Receiver<DomainEvent>,
    ) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    Self::deliver(transport.as_ref(), listener.as_ref(), &event).await;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event fan-out lagged, some events were not delivered");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, fan-out shutting down");
                    break;
                }
            }
        }
    }

    /// Deliver a single event. Returns the users whose send failed.
    pub async fn deliver(
        transport: &dyn Transport,
        listener: Option<&Arc<dyn LivenessListener>>,
        event: &DomainEvent,
    ) -> Vec<dispatch_core::types::DbId> {
        if event.audiences.is_empty() {
            return Vec::new();
        }
        let failed = transport
            .send(&event.audiences, &event.event_name, &event.payload)
            .await;

        for user_id in &failed {
            tracing::debug!(user_id, event = %event.event_name, "Send failed, checking liveness");
            if let Some(listener) = listener {
                let listener = Arc::clone(listener);
                let user_id = *user_id;
                tokio::spawn(async move {
                    listener.liveness_suspect(user_id).await;
                });
            }
        }
        failed
    }
}
