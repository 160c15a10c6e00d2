//! Typed notifications from a scan session to whatever renders it.
//!
//! Publishing never blocks: a subscriber that falls behind loses the oldest
//! events rather than stalling the coordinator.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::{
    error::ScanError,
    models::DisplayEntry,
    scanner::{DecoderState, PermissionState},
};

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tone {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScanEvent {
    DecoderStateChanged {
        state: DecoderState,
        permission: PermissionState,
    },
    /// Transient message; the view clears it after `auto_clear_ms`.
    Toast {
        tone: Tone,
        message: String,
        auto_clear_ms: u64,
    },
    EntryUpserted {
        entry: DisplayEntry,
        replaced: bool,
    },
    /// Persistent panel with a retry control; scanning does not resume on
    /// its own.
    DeviceError {
        error: ScanError,
        message: String,
    },
    SessionClosed {
        session_id: String,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ScanEvent) {
        // No subscribers is not an error for a headless session.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(ScanEvent::SessionClosed {
            session_id: "s1".into(),
        });

        for rx in [&mut first, &mut second] {
            match rx.recv().await.unwrap() {
                ScanEvent::SessionClosed { session_id } => assert_eq!(session_id, "s1"),
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        EventBus::new(4).publish(ScanEvent::SessionClosed {
            session_id: "s1".into(),
        });
    }
}
