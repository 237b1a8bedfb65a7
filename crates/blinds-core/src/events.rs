//! Broadcast-based notification sink.
//!
//! [`EventDispatcher`] implements [`NotificationSink`] by turning each call
//! into a [`BlindsEvent`] on a `tokio::sync::broadcast` channel, so any number
//! of front ends can follow the fleet without the controller knowing about
//! them.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use blinds_types::DeviceId;

use crate::traits::NotificationSink;

/// Events emitted for the fleet.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum BlindsEvent {
    /// A device reported its current position.
    Changed {
        device: DeviceId,
        value: u32,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
    /// A device dropped off unexpectedly.
    Missing {
        device: DeviceId,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
}

impl BlindsEvent {
    /// The device the event is about.
    pub fn device(&self) -> &DeviceId {
        match self {
            BlindsEvent::Changed { device, .. } | BlindsEvent::Missing { device, .. } => device,
        }
    }
}

/// Sender for fleet events.
pub type EventSender = broadcast::Sender<BlindsEvent>;

/// Receiver for fleet events.
pub type EventReceiver = broadcast::Receiver<BlindsEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: BlindsEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

impl NotificationSink for EventDispatcher {
    fn on_change(&self, device: &DeviceId, value: u32) {
        self.send(BlindsEvent::Changed {
            device: device.clone(),
            value,
            at: OffsetDateTime::now_utc(),
        });
    }

    fn on_missing(&self, device: &DeviceId) {
        self.send(BlindsEvent::Missing {
            device: device.clone(),
            at: OffsetDateTime::now_utc(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatcher_delivers_to_all_receivers() {
        let dispatcher = EventDispatcher::new(8);
        let mut rx1 = dispatcher.subscribe();
        let mut rx2 = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        let device = DeviceId::new("03:80:E1:00:00:01");
        dispatcher.on_change(&device, 75);

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                BlindsEvent::Changed { device: d, value, .. } => {
                    assert_eq!(d, device);
                    assert_eq!(value, 75);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_send_without_receivers_is_silent() {
        let dispatcher = EventDispatcher::default();
        dispatcher.on_missing(&DeviceId::new("03:80:E1:00:00:01"));
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = BlindsEvent::Missing {
            device: DeviceId::new("03:80:E1:00:00:02"),
            at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "missing");
        assert_eq!(json["device"], "03:80:E1:00:00:02");
        assert_eq!(json["at"], "1970-01-01T00:00:00Z");

        let back: BlindsEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.device().as_str(), "03:80:E1:00:00:02");
    }
}
