//! Blocking FIFO queue shared between pipeline stages.
//!
//! Every hop of the pipeline goes through a [`Channel`]. A positive capacity
//! turns it into a backpressure point: a producer that outruns its consumer
//! parks in [`Channel::push`] until a slot frees up, which in turn stalls
//! everything upstream of it down to the capture device.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub struct Channel<T> {
    capacity: usize,
    queue: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> Channel<T> {
    /// Creates a channel holding at most `capacity` items. Zero means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Appends `item`, blocking while the channel is full.
    pub fn push(&self, item: T) {
        {
            let mut queue = self.lock();
            while self.is_full(&queue) {
                queue = self
                    .not_full
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            queue.push_back(item);
        }
        self.not_empty.notify_one();
    }

    /// Appends `item` only if there is room, handing it back otherwise.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        {
            let mut queue = self.lock();
            if self.is_full(&queue) {
                return Err(item);
            }
            queue.push_back(item);
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head item, blocking until one is available.
    pub fn pop(&self) -> T {
        let item = {
            let mut queue = self.lock();
            loop {
                if let Some(item) = queue.pop_front() {
                    break item;
                }
                queue = self
                    .not_empty
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        self.not_full.notify_one();
        item
    }

    /// Removes the head item if there is one, without blocking.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.lock().pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    fn is_full(&self, queue: &VecDeque<T>) -> bool {
        self.capacity > 0 && queue.len() >= self.capacity
    }

    // Nothing runs under the lock besides VecDeque bookkeeping, so a
    // poisoned queue is still consistent.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
