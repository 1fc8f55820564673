use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for the receive loop. Shared with whoever wants to
/// report on it; all updates are relaxed increments.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    connections: AtomicU64,
    frames_assembled: AtomicU64,
    frames_published: AtomicU64,
    decode_failures: AtomicU64,
    processing_failures: AtomicU64,
    protocol_errors: AtomicU64,
    transport_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections: u64,
    pub frames_assembled: u64,
    pub frames_published: u64,
    pub decode_failures: u64,
    pub processing_failures: u64,
    pub protocol_errors: u64,
    pub transport_errors: u64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_assembled(&self) {
        self.frames_assembled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing_failure(&self) {
        self.processing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            frames_assembled: self.frames_assembled.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            processing_failures: self.processing_failures.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}
