//! Capacity-limited, blocking FIFO shared between the stripe producer and
//! any number of consumers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::warn;

/// Called with the queue contents when a push finds the queue full.
/// Whatever it leaves behind is kept; the new item is appended afterwards.
pub type OverflowHandler<T> = Box<dyn Fn(&mut VecDeque<T>) + Send + Sync>;

/// Overflow policy that discards the oldest `capacity / 2` items (at least one).
///
/// As long as one frame's stripes fit in half the queue, the newest frame is
/// never touched. Sources that emit stripes out of frame order can lose parts
/// of their newest frame under this policy.
pub fn erase_oldest_half<T>(capacity: usize) -> OverflowHandler<T> {
    let count = (capacity / 2).max(1);
    Box::new(move |items: &mut VecDeque<T>| {
        let count = count.min(items.len());
        items.drain(..count);
    })
}

pub struct BoundedQueue<T> {
    items:       Mutex<VecDeque<T>>,
    new_item:    Condvar,
    capacity:    usize,
    on_overflow: OverflowHandler<T>,
    evicted:     AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, on_overflow: OverflowHandler<T>) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be non-zero");
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            new_item: Condvar::new(),
            capacity,
            on_overflow,
            evicted: AtomicU64::new(0),
        }
    }

    /// Queue using the [`erase_oldest_half`] policy.
    pub fn with_eviction_of_oldest_half(capacity: usize) -> Self {
        Self::new(capacity, erase_oldest_half(capacity))
    }

    /// Append `item`, applying the overflow policy first if the queue is full.
    pub fn push(&self, item: T) {
        let mut items = self.lock();
        if items.len() >= self.capacity {
            let before = items.len();
            (self.on_overflow)(&mut *items);
            let dropped = before.saturating_sub(items.len());
            if dropped > 0 {
                self.evicted.fetch_add(dropped as u64, Ordering::Relaxed);
                warn!("Queue full ({} items): evicted {} oldest", before, dropped);
            }
        }
        items.push_back(item);
        self.new_item.notify_one();
    }

    /// Remove the oldest item, blocking until one is available.
    ///
    /// Never returns if nothing is pushed again; callers that can outlive the
    /// producer should use [`pop_timeout`](Self::pop_timeout).
    pub fn pop(&self) -> T {
        let items = self.lock();
        let mut items = self
            .new_item
            .wait_while(items, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        match items.pop_front() {
            Some(item) => item,
            None => unreachable!("wait_while returned with an empty queue"),
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let items = self.lock();
        let (mut items, _) = self
            .new_item
            .wait_timeout_while(items, timeout, |items| items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        items.pop_front()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items discarded by the overflow policy.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
