//! Single-slot blocking handoff between a producer and a consumer thread.
//!
//! Unlike a channel, the stack holds at most one element: a producer that
//! overwrites via [`ConcurrentMonoStack::insert`] always hands over the
//! freshest value, while [`ConcurrentMonoStack::push`] applies
//! backpressure by blocking until the consumer drains the slot. Closing
//! wakes every waiter, and once the final element has been drained an
//! atomic flag lets readers return without ever taking the lock.

use puncta_core::{Error, Result};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// What insertion operations do once the stack is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosedPolicy {
    /// Insertions on a closed stack are ignored and report `false`.
    #[default]
    Ignore,
    /// Insertions on a closed stack fail with [`Error::Closed`].
    Fail,
}

#[derive(Debug)]
struct Slot<E> {
    item: Option<E>,
    closed: bool,
}

/// A thread-safe single-slot blocking stack.
#[derive(Debug)]
pub struct ConcurrentMonoStack<E> {
    slot: Mutex<Slot<E>>,
    not_empty: Condvar,
    not_full: Condvar,
    closed_and_empty: AtomicBool,
    policy: ClosedPolicy,
}

impl<E> Default for ConcurrentMonoStack<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ConcurrentMonoStack<E> {
    /// Creates an open stack with the default [`ClosedPolicy::Ignore`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ClosedPolicy::Ignore)
    }

    /// Creates an open stack with the given closed-insertion policy.
    #[must_use]
    pub fn with_policy(policy: ClosedPolicy) -> Self {
        Self {
            slot: Mutex::new(Slot {
                item: None,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            closed_and_empty: AtomicBool::new(false),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<E>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn closed_result(&self) -> Result<bool> {
        match self.policy {
            ClosedPolicy::Ignore => Ok(false),
            ClosedPolicy::Fail => Err(Error::Closed),
        }
    }

    /// Adds an element, blocking while the slot is occupied.
    ///
    /// Returns `Ok(true)` once the element is stored and `Ok(false)` when
    /// the stack was closed first (under [`ClosedPolicy::Ignore`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] instead of `Ok(false)` under
    /// [`ClosedPolicy::Fail`].
    pub fn push(&self, element: E) -> Result<bool> {
        let slot = self.lock();
        let mut slot = self
            .not_full
            .wait_while(slot, |s| s.item.is_some() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if slot.closed {
            return self.closed_result();
        }
        slot.item = Some(element);
        drop(slot);
        self.not_empty.notify_one();
        Ok(true)
    }

    /// Adds an element only if the slot is free, without blocking.
    ///
    /// Returns `Ok(false)` when the slot is occupied or the stack closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] for a closed stack under
    /// [`ClosedPolicy::Fail`].
    pub fn offer(&self, element: E) -> Result<bool> {
        let mut slot = self.lock();
        if slot.closed {
            return self.closed_result();
        }
        if slot.item.is_some() {
            return Ok(false);
        }
        slot.item = Some(element);
        drop(slot);
        self.not_empty.notify_one();
        Ok(true)
    }

    /// Adds an element, overwriting whatever currently occupies the slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] for a closed stack under
    /// [`ClosedPolicy::Fail`].
    pub fn insert(&self, element: E) -> Result<bool> {
        let mut slot = self.lock();
        if slot.closed {
            return self.closed_result();
        }
        slot.item = Some(element);
        drop(slot);
        self.not_empty.notify_one();
        Ok(true)
    }

    /// Removes the element, blocking while the slot is empty.
    ///
    /// Returns `None` once the stack is closed and drained.
    pub fn pop(&self) -> Option<E> {
        if self.closed_and_empty.load(Ordering::Acquire) {
            return None;
        }
        let slot = self.lock();
        let slot = self
            .not_empty
            .wait_while(slot, |s| s.item.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        self.take(slot)
    }

    /// Removes the element without blocking.
    ///
    /// Returns `None` when the slot is empty.
    pub fn poll(&self) -> Option<E> {
        if self.closed_and_empty.load(Ordering::Acquire) {
            return None;
        }
        let slot = self.lock();
        self.take(slot)
    }

    fn take(&self, mut slot: MutexGuard<'_, Slot<E>>) -> Option<E> {
        let item = slot.item.take();
        if slot.closed && slot.item.is_none() {
            self.closed_and_empty.store(true, Ordering::Release);
        }
        drop(slot);
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Closes the stack, waking all blocked producers and consumers.
    ///
    /// With `flush` set, any element still in the slot is discarded so
    /// consumers see an already-drained stack.
    pub fn close(&self, flush: bool) {
        let mut slot = self.lock();
        slot.closed = true;
        if flush {
            slot.item = None;
        }
        if slot.item.is_none() {
            self.closed_and_empty.store(true, Ordering::Release);
        }
        drop(slot);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Returns true once the stack has been closed.
    pub fn is_closed(&self) -> bool {
        if self.closed_and_empty.load(Ordering::Acquire) {
            return true;
        }
        self.lock().closed
    }

    /// Number of elements currently held (zero or one).
    pub fn len(&self) -> usize {
        if self.closed_and_empty.load(Ordering::Acquire) {
            return 0;
        }
        usize::from(self.lock().item.is_some())
    }

    /// Returns true when the slot is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: Clone> ConcurrentMonoStack<E> {
    /// Returns a copy of the element without removing it.
    pub fn peek(&self) -> Option<E> {
        if self.closed_and_empty.load(Ordering::Acquire) {
            return None;
        }
        self.lock().item.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_offer_and_poll() {
        let stack = ConcurrentMonoStack::new();
        assert!(stack.is_empty());
        assert!(stack.offer(1).unwrap());
        assert_eq!(stack.len(), 1);
        // The slot is occupied.
        assert!(!stack.offer(2).unwrap());
        assert_eq!(stack.peek(), Some(1));
        assert_eq!(stack.poll(), Some(1));
        assert_eq!(stack.poll(), None);
    }

    #[test]
    fn test_insert_overwrites() {
        let stack = ConcurrentMonoStack::new();
        assert!(stack.insert(1).unwrap());
        assert!(stack.insert(2).unwrap());
        assert_eq!(stack.poll(), Some(2));
    }

    #[test]
    fn test_close_with_flush_contract() {
        let stack = ConcurrentMonoStack::new();
        stack.offer(7).unwrap();
        stack.close(true);
        assert!(stack.is_closed());
        assert_eq!(stack.len(), 0);
        assert_eq!(stack.poll(), None);
        // Does not block and reports rejection under the default policy.
        assert!(!stack.push(8).unwrap());
        assert!(!stack.offer(8).unwrap());
        assert!(!stack.insert(8).unwrap());
    }

    #[test]
    fn test_close_without_flush_drains_last_element() {
        let stack = ConcurrentMonoStack::new();
        stack.offer(7).unwrap();
        stack.close(false);
        assert_eq!(stack.pop(), Some(7));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn test_fail_policy() {
        let stack = ConcurrentMonoStack::with_policy(ClosedPolicy::Fail);
        stack.close(true);
        assert!(matches!(stack.push(1), Err(Error::Closed)));
        assert!(matches!(stack.offer(1), Err(Error::Closed)));
        assert!(matches!(stack.insert(1), Err(Error::Closed)));
    }

    #[test]
    fn test_producer_consumer_handoff() {
        let stack = Arc::new(ConcurrentMonoStack::new());
        let producer = {
            let stack = Arc::clone(&stack);
            thread::spawn(move || {
                for i in 0..100 {
                    assert!(stack.push(i).unwrap());
                }
                stack.close(false);
            })
        };
        let consumer = {
            let stack = Arc::clone(&stack);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(i) = stack.pop() {
                    seen.push(i);
                }
                seen
            })
        };
        producer.join().unwrap();
        let seen = consumer.join().unwrap();
        // Backpressure hands every element over exactly once, in order.
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        assert_eq!(stack.pop(), None);
    }
}
