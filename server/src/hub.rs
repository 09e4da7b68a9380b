//! Ordered fan-out of arena events.
//!
//! The hub lives inside the same lock as the arena, so sequence numbers and
//! channel order both follow apply order. A subscriber taken under that lock
//! together with a snapshot sees every later event exactly once.

use sabong_types::{Envelope, Event, Snapshot, Viewer};
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct Hub {
    seq: u64,
    sender: broadcast::Sender<Arc<Envelope>>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { seq: 0, sender }
    }

    /// Sequence number of the last published event.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn publish(&mut self, event: Event) -> u64 {
        self.seq += 1;
        tracing::debug!(seq = self.seq, kind = event.kind(), "event published");
        // No receivers is fine: late joiners start from a snapshot.
        let _ = self.sender.send(Arc::new(Envelope {
            seq: self.seq,
            event,
        }));
        self.seq
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Envelope>> {
        self.sender.subscribe()
    }

    pub fn observers(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Wraps a snapshot taken at `seq`.
pub fn snapshot_envelope(seq: u64, snapshot: Snapshot) -> Envelope {
    Envelope {
        seq,
        event: Event::StateSnapshot(Box::new(snapshot)),
    }
}

/// The envelope as `viewer` may see it; `None` when the event is hidden.
pub fn view_for(envelope: &Envelope, viewer: &Viewer) -> Option<Envelope> {
    envelope.event.visible_to(viewer).map(|event| Envelope {
        seq: envelope.seq,
        event,
    })
}
