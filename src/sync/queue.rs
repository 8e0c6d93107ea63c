//! Pts-ordered bounded frame queue
//!
//! Decode completion order does not have to match submission order, so every
//! insert places the frame at its sorted position. The queue doubles as the
//! jitter buffer: the scheduling tick only ever looks at the head.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::{DecodedAudioFrame, DecodedVideoFrame};

/// Anything with a presentation timestamp
pub trait Timestamped {
    fn pts(&self) -> u64;
}

impl Timestamped for DecodedVideoFrame {
    fn pts(&self) -> u64 {
        self.pts
    }
}

impl Timestamped for DecodedAudioFrame {
    fn pts(&self) -> u64 {
        self.pts
    }
}

/// What to do when a push finds the queue full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the earliest frame (lowest pts), keeping latency bounded
    #[default]
    DropOldest,
    /// Reject the incoming frame
    DropNewest,
}

/// Result of a push
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    Inserted,
    /// Queue was full; this frame was evicted to make room
    Evicted(T),
    /// Queue was full; the incoming frame was not inserted
    Rejected(T),
}

/// Sorted, capacity-bounded frame queue
///
/// Safe to share between the decode-completion producer and the scheduling
/// consumer; each operation holds the lock only for the queue manipulation.
pub struct FrameQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    overflow_count: AtomicU64,
}

impl<T: Timestamped> FrameQueue<T> {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            overflow_count: AtomicU64::new(0),
        }
    }

    /// Insert at the sorted position, after any frames with equal pts
    pub fn push(&self, frame: T) -> PushOutcome<T> {
        let mut queue = self.inner.lock();

        if queue.len() >= self.capacity && self.policy == OverflowPolicy::DropNewest {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            return PushOutcome::Rejected(frame);
        }

        let pts = frame.pts();
        let pos = queue.partition_point(|f| f.pts() <= pts);
        queue.insert(pos, frame);

        if queue.len() > self.capacity {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            if let Some(evicted) = queue.pop_front() {
                return PushOutcome::Evicted(evicted);
            }
        }
        PushOutcome::Inserted
    }

    pub fn pop_front(&self) -> Option<T> {
        self.inner.lock().pop_front()
    }

    /// Pop the head only if `pred` accepts its pts
    pub fn pop_front_if(&self, pred: impl FnOnce(u64) -> bool) -> Option<T> {
        let mut queue = self.inner.lock();
        match queue.front() {
            Some(head) if pred(head.pts()) => queue.pop_front(),
            _ => None,
        }
    }

    pub fn front_pts(&self) -> Option<u64> {
        self.inner.lock().front().map(|f| f.pts())
    }

    /// Remove and return every queued frame in order
    pub fn drain_all(&self) -> Vec<T> {
        self.inner.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Queued pts values, head first
    pub fn pts_snapshot(&self) -> Vec<u64> {
        self.inner.lock().iter().map(|f| f.pts()).collect()
    }

    pub fn is_sorted(&self) -> bool {
        let queue = self.inner.lock();
        queue
            .iter()
            .zip(queue.iter().skip(1))
            .all(|(a, b)| a.pts() <= b.pts())
    }
}
