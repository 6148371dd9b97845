// src/application/queue.rs
// Bounded priority queue between the listing detector and the event processor

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use crate::domain::models::{Coin, CoinEvent};

/// Push-stream detections and status changes.
pub const PRIORITY_PUSH: i64 = 1;
/// Poll-stream detections.
pub const PRIORITY_POLL: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    CreateCoin,
    UpdateCoin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub event: CoinEvent,
    pub coin: Coin,
    /// Lower is more urgent.
    pub priority: i64,
    pub action: QueueAction,
}

struct Entry {
    priority: i64,
    seq: u64,
    item: QueueItem,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap; reverse so the smallest (priority, seq) is on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    dropped: u64,
}

/// Min-heap on priority, FIFO among equal priorities. A push onto a full
/// queue drops the pushed item.
pub struct EventQueue {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::with_capacity(capacity.min(4096)),
                next_seq: 0,
                dropped: 0,
            }),
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the heap half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns false when the queue was full and the item was dropped.
    pub fn push(&self, item: QueueItem) -> bool {
        let mut inner = self.lock();
        if inner.heap.len() >= self.capacity {
            inner.dropped += 1;
            log::warn!(
                "Event queue full ({}), dropping {:?} for {} at priority {}",
                self.capacity,
                item.action,
                item.coin.symbol,
                item.priority
            );
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Entry {
            priority: item.priority,
            seq,
            item,
        });
        true
    }

    pub fn pop(&self) -> Option<QueueItem> {
        self.lock().heap.pop().map(|entry| entry.item)
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }
}
