use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the observer stream, served at `/metrics/ws`.
#[derive(Default)]
pub struct WsMetrics {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    events_sent: AtomicU64,
    events_filtered: AtomicU64,
    lagged: AtomicU64,
    resyncs: AtomicU64,
    queue_full: AtomicU64,
    send_errors: AtomicU64,
    send_timeouts: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WsMetricsSnapshot {
    pub active_connections: u64,
    pub connections_opened: u64,
    pub events_sent: u64,
    pub events_filtered: u64,
    pub lagged: u64,
    pub resyncs: u64,
    pub queue_full: u64,
    pub send_errors: u64,
    pub send_timeouts: u64,
}

impl WsMetrics {
    pub fn snapshot(&self) -> WsMetricsSnapshot {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);
        WsMetricsSnapshot {
            active_connections: opened.saturating_sub(closed),
            connections_opened: opened,
            events_sent: self.events_sent.load(Ordering::Relaxed),
            events_filtered: self.events_filtered.load(Ordering::Relaxed),
            lagged: self.lagged.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            send_timeouts: self.send_timeouts.load(Ordering::Relaxed),
        }
    }

    pub fn inc_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.events_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_filtered(&self) {
        self.events_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_lagged(&self, skipped: u64) {
        self.lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    pub fn inc_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_send_timeout(&self) {
        self.send_timeouts.fetch_add(1, Ordering::Relaxed);
    }
}
