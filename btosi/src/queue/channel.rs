use crate::error::Result;
use crate::reactor::{Reactor, Watch};
use crate::sync::Semaphore;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::os::fd::RawFd;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Which end of the queue an operation works on.
#[derive(Clone, Copy)]
enum End {
    Front,
    Back,
}

/// Thread-safe bounded FIFO gated by two semaphores.
///
/// The enqueue semaphore counts free slots and the dequeue semaphore counts
/// queued items; at rest their sum equals the capacity. Both are backed by
/// `eventfd`s, so either side can be watched by a [`Reactor`].
///
/// A channel of capacity 0 is a hand-off: an item only moves when a
/// consumer is waiting for it.
pub struct BoundedChannel<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    enqueue_sem: Semaphore,
    dequeue_sem: Semaphore,

    /// Registration made by [`register_dequeue`](Self::register_dequeue).
    watch: Mutex<Option<(Arc<Reactor>, Watch)>>,
}

impl<T> BoundedChannel<T> {
    /// Creates an empty channel holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self> {
        let enqueue_sem = Semaphore::new(capacity)?;
        let dequeue_sem = Semaphore::new(0)?;

        Ok(Self {
            capacity,
            items: Mutex::new(VecDeque::new()),
            enqueue_sem,
            dequeue_sem,
            watch: Mutex::new(None),
        })
    }

    /// Appends `item`, blocking while the channel is full.
    pub fn enqueue(&self, item: T) {
        self.enqueue_sem.wait();
        self.insert(item, End::Back);
    }

    /// Appends `item` if a slot is free; otherwise hands it back.
    pub fn try_enqueue(&self, item: T) -> std::result::Result<(), T> {
        if !self.enqueue_sem.try_wait() {
            return Err(item);
        }

        self.insert(item, End::Back);
        Ok(())
    }

    /// Removes the front item, blocking while the channel is empty.
    pub fn dequeue(&self) -> T {
        self.take_blocking(End::Front)
    }

    /// Removes the front item if there is one.
    pub fn try_dequeue(&self) -> Option<T> {
        self.try_take(End::Front)
    }

    /// Inserts `item` at the front, so that it is the next one dequeued.
    pub fn push(&self, item: T) {
        self.enqueue_sem.wait();
        self.insert(item, End::Front);
    }

    /// Inserts `item` at the front if a slot is free; otherwise hands it back.
    pub fn try_push(&self, item: T) -> std::result::Result<(), T> {
        if !self.enqueue_sem.try_wait() {
            return Err(item);
        }

        self.insert(item, End::Front);
        Ok(())
    }

    /// Removes the back item, blocking while the channel is empty.
    pub fn pull(&self) -> T {
        self.take_blocking(End::Back)
    }

    /// Removes the back item if there is one.
    pub fn try_pull(&self) -> Option<T> {
        self.try_take(End::Back)
    }

    /// Removes the first item equal to `item`.
    pub fn remove(&self, item: &T) -> Option<T>
    where
        T: PartialEq,
    {
        self.remove_where(|queued| queued == item)
    }

    /// Removes the first item matching `predicate`.
    ///
    /// Returns `None` if nothing matches, or if the matching item has
    /// already been claimed by a consumer that is about to take it.
    ///
    /// The freed slot is handed back to producers. On a capacity-0 channel
    /// that slot belongs to the consumer still waiting for the removed
    /// item, which then receives the next one enqueued.
    pub fn remove_where<P>(&self, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let mut items = self.items.lock();

        let index = items.iter().position(|queued| predicate(queued))?;

        if !self.dequeue_sem.try_wait() {
            return None;
        }

        let item = items.remove(index);
        drop(items);

        self.enqueue_sem.post();
        item
    }

    /// Removes every queued item, passing each one to `f`.
    ///
    /// `f` runs without the channel lock held. Slots are released as in
    /// [`remove_where`](Self::remove_where).
    pub fn flush<F>(&self, mut f: F)
    where
        F: FnMut(T),
    {
        while self.dequeue_sem.try_wait() {
            let item = self.pop(End::Front);
            self.enqueue_sem.post();
            f(item);
        }
    }

    /// Drops every queued item.
    pub fn clear(&self) {
        self.flush(drop);
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the channel holds no item.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Descriptor that is readable while an item is available.
    pub fn dequeue_fd(&self) -> RawFd {
        self.dequeue_sem.fd()
    }

    /// Descriptor that is readable while a slot is free.
    pub fn enqueue_fd(&self) -> RawFd {
        self.enqueue_sem.fd()
    }

    /// Blocks until a slot looks free, without claiming it.
    pub(crate) fn wait_not_full(&self) {
        self.enqueue_sem.wait_available();
    }

    /// Like `wait_not_full`, giving up after `timeout`.
    pub(crate) fn wait_not_full_timeout(&self, timeout: Duration) -> bool {
        self.enqueue_sem.wait_available_timeout(timeout)
    }

    /// Stops watching the dequeue descriptor.
    ///
    /// Does nothing if the channel is not registered.
    pub fn unregister_dequeue(&self) {
        let registration = self.watch.lock().take();

        if let Some((reactor, watch)) = registration {
            reactor.unregister(watch);
        }
    }

    fn insert(&self, item: T, end: End) {
        {
            let mut items = self.items.lock();
            match end {
                End::Front => items.push_front(item),
                End::Back => items.push_back(item),
            }
        }

        self.dequeue_sem.post();
    }

    fn take_blocking(&self, end: End) -> T {
        if self.capacity == 0 {
            // Let exactly one producer through.
            self.enqueue_sem.post();
            self.dequeue_sem.wait();
            return self.pop(end);
        }

        self.dequeue_sem.wait();
        let item = self.pop(end);
        self.enqueue_sem.post();
        item
    }

    fn try_take(&self, end: End) -> Option<T> {
        if self.capacity == 0 {
            self.enqueue_sem.post();

            if self.dequeue_sem.try_wait() {
                return Some(self.pop(end));
            }

            if self.enqueue_sem.try_wait() {
                // Permit retracted, no producer was waiting.
                return None;
            }

            // A producer took the permit; its item is on the way.
            self.dequeue_sem.wait();
            return Some(self.pop(end));
        }

        if !self.dequeue_sem.try_wait() {
            return None;
        }

        let item = self.pop(end);
        self.enqueue_sem.post();
        Some(item)
    }

    /// Pops an item the caller already holds a dequeue permit for.
    fn pop(&self, end: End) -> T {
        let mut items = self.items.lock();
        let item = match end {
            End::Front => items.pop_front(),
            End::Back => items.pop_back(),
        };

        item.expect("dequeue permit taken without a queued item")
    }
}

impl<T: Clone> BoundedChannel<T> {
    /// Returns a copy of the front item.
    pub fn peek_first(&self) -> Option<T> {
        self.items.lock().front().cloned()
    }

    /// Returns a copy of the back item.
    pub fn peek_last(&self) -> Option<T> {
        self.items.lock().back().cloned()
    }
}

impl<T: Send + 'static> BoundedChannel<T> {
    /// Watches the dequeue descriptor on `reactor`.
    ///
    /// `ready` runs on the reactor thread whenever an item is available; it
    /// is expected to dequeue. Any previous registration is replaced.
    pub fn register_dequeue<F>(self: &Arc<Self>, reactor: &Arc<Reactor>, mut ready: F) -> Result<()>
    where
        F: FnMut(&BoundedChannel<T>) + Send + 'static,
    {
        self.unregister_dequeue();

        let channel: Weak<Self> = Arc::downgrade(self);
        let watch = reactor.register_read(self.dequeue_fd(), move || {
            if let Some(channel) = channel.upgrade() {
                ready(&channel);
            }
        })?;

        *self.watch.lock() = Some((Arc::clone(reactor), watch));
        Ok(())
    }
}

impl<T> Drop for BoundedChannel<T> {
    fn drop(&mut self) {
        self.unregister_dequeue();
    }
}
