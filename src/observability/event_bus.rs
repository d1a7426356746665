//! Tokio broadcast event bus for conversion lifecycle notifications.

use crate::models::ConversionEvent;
use tokio::sync::broadcast;

const DEFAULT_EVENT_BUS_CAPACITY: usize = 1024;

/// Event bus broadcasting conversion events to every subscriber.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConversionEvent>,
}

/// Filtered receiver that yields events matching a predicate.
pub struct FilteredReceiver<F> {
    receiver: broadcast::Receiver<ConversionEvent>,
    predicate: F,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers (best effort).
    pub fn publish(&self, event: ConversionEvent) {
        let event_type = event.event_type();
        metrics::counter!("conversion.events.published", "type" => event_type).increment(1);
        if self.sender.send(event).is_err() {
            tracing::debug!(event_type, "No event subscribers");
        }
    }

    /// Subscribes to the event bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConversionEvent> {
        self.sender.subscribe()
    }

    /// Subscribes to events matching the provided event type.
    #[must_use]
    pub fn subscribe_event_type(
        &self,
        event_type: &'static str,
    ) -> FilteredReceiver<impl Fn(&ConversionEvent) -> bool + use<>> {
        FilteredReceiver {
            receiver: self.sender.subscribe(),
            predicate: move |event: &ConversionEvent| event.event_type() == event_type,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUS_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl<F> FilteredReceiver<F>
where
    F: Fn(&ConversionEvent) -> bool,
{
    /// Receives the next event that matches the predicate.
    ///
    /// # Errors
    ///
    /// Returns an error once the bus is closed.
    pub async fn recv(&mut self) -> Result<ConversionEvent, broadcast::error::RecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if (self.predicate)(&event) {
                        return Ok(event);
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics::counter!("conversion.events.lagged").increment(skipped);
                },
                Err(err) => return Err(err),
            }
        }
    }
}
