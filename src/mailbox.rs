use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::RawMutex, Mutex};
use heapless::Deque;

/// Fixed-capacity FIFO shared between the channel drain and event processing.
///
/// Every operation takes the lock once, touches the ring and releases it;
/// nothing inside the critical section blocks or locks anything else.
/// A push onto a full mailbox is rejected and the item is dropped; the
/// items already queued are left as they were.
pub struct Mailbox<M: RawMutex, T, const N: usize> {
    ring: Mutex<M, RefCell<Deque<T, N>>>,
}

impl<M: RawMutex, T, const N: usize> Mailbox<M, T, N> {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub fn try_push(&self, item: T) -> bool {
        self.ring
            .lock(|ring| ring.borrow_mut().push_back(item).is_ok())
    }

    pub fn try_pop(&self) -> Option<T> {
        self.ring.lock(|ring| ring.borrow_mut().pop_front())
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock(|ring| ring.borrow().is_empty())
    }

    pub fn len(&self) -> usize {
        self.ring.lock(|ring| ring.borrow().len())
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<M: RawMutex, T, const N: usize> Default for Mailbox<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}
