use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::decoder::DecodedImage;
use crate::hook::ProcessedImage;

/// A decoded frame together with its processed counterpart.
///
/// `processed` is `None` when the processing hook failed for this frame; the
/// raw image is still published so the live view keeps moving.
#[derive(Debug)]
pub struct FramePair {
    sequence: u64,
    received_at_ms: i64,
    frame_len: usize,
    raw: DecodedImage,
    processed: Option<ProcessedImage>,
}

impl FramePair {
    pub fn new(raw: DecodedImage, processed: Option<ProcessedImage>, frame_len: usize) -> Self {
        Self {
            sequence: 0,
            received_at_ms: Utc::now().timestamp_millis(),
            frame_len,
            raw,
            processed,
        }
    }

    /// Publish order, starting at 1. Zero until the pair is published.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn received_at_ms(&self) -> i64 {
        self.received_at_ms
    }

    /// Size of the encoded frame this pair was decoded from.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn raw(&self) -> &DecodedImage {
        &self.raw
    }

    pub fn processed(&self) -> Option<&ProcessedImage> {
        self.processed.as_ref()
    }
}

/// Single-slot "latest wins" handoff between the receive loop and consumers.
///
/// `publish` replaces whatever is held; nothing is queued, so a slow consumer
/// simply never sees the pairs that were overwritten. The lock only guards
/// the pointer swap, and a replaced pair is dropped after the lock is
/// released (or later, once the last reader lets go of it).
pub struct LatestFrameBuffer {
    slot: Mutex<Option<Arc<FramePair>>>,
    sequence: AtomicU64,
}

impl LatestFrameBuffer {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            sequence: AtomicU64::new(0),
        }
    }

    /// Replace the current pair and return the sequence number assigned to it.
    pub fn publish(&self, mut pair: FramePair) -> u64 {
        let (seq, previous) = {
            let mut slot = self.slot.lock();
            let seq = self.sequence.load(Ordering::Relaxed) + 1;
            pair.sequence = seq;
            let previous = slot.replace(Arc::new(pair));
            self.sequence.store(seq, Ordering::Release);
            (seq, previous)
        };
        drop(previous);
        seq
    }

    /// The most recently published pair, if any.
    pub fn latest(&self) -> Option<Arc<FramePair>> {
        self.slot.lock().clone()
    }

    /// Sequence number of the last publish; 0 before the first one.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }
}

impl Default for LatestFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
