use super::event::{Event, Interest};
use super::watch::{Callback, Watch, WatchEntry};
use crate::error::{Error, Result};
use crate::sys::Poller;
use crate::sys::epoll::{MAX_EVENTS, WAKE_TOKEN};
use crate::utils::Slab;

use parking_lot::Mutex;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

static NEXT_REACTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Why a run of the reactor returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// [`Reactor::stop`] was observed.
    Stopped,
    /// The requested number of iterations completed.
    Done,
}

/// Registry protected by the list lock.
struct Registry {
    watches: Slab<Arc<WatchEntry>>,

    /// Tokens unregistered from another thread during the current
    /// iteration. Events already fetched for them are skipped.
    invalidated: Vec<u64>,
}

/// Single-threaded epoll loop.
///
/// A reactor owns an epoll instance and a private wake-up descriptor. Any
/// thread may register or unregister descriptors and request a stop; the
/// callbacks themselves only ever run on the thread driving
/// [`start`](Self::start), [`run`](Self::run) or [`run_once`](Self::run_once).
pub struct Reactor {
    id: u64,
    poller: Poller,
    registry: Mutex<Registry>,

    /// Thread currently running the loop.
    owner: Mutex<Option<ThreadId>>,
}

impl Reactor {
    /// Creates a reactor.
    ///
    /// # Panics
    ///
    /// Panics if the epoll instance or the wake-up eventfd cannot be created.
    pub fn new() -> Self {
        let poller = match Poller::new() {
            Ok(poller) => poller,
            Err(e) => {
                tracing::error!(error = %e, "unable to create reactor");
                panic!("unable to create reactor: {e}");
            }
        };

        Self {
            id: NEXT_REACTOR_ID.fetch_add(1, Ordering::Relaxed),
            poller,
            registry: Mutex::new(Registry {
                watches: Slab::new(MAX_EVENTS),
                invalidated: Vec::new(),
            }),
            owner: Mutex::new(None),
        }
    }

    /// Runs until [`stop`](Self::stop) is called.
    pub fn start(&self) -> Result<RunStatus> {
        self.run(0)
    }

    /// Runs exactly one wait iteration.
    pub fn run_once(&self) -> Result<RunStatus> {
        self.run(1)
    }

    /// Runs at most `iterations` wait iterations; `0` means forever.
    ///
    /// Returns [`RunStatus::Stopped`] when a stop request is observed and
    /// [`RunStatus::Done`] once `iterations` have run.
    pub fn run(&self, iterations: usize) -> Result<RunStatus> {
        let _owner = OwnerGuard::enter(self);

        let mut events = Vec::with_capacity(MAX_EVENTS);
        let mut remaining = iterations;

        loop {
            if iterations != 0 {
                if remaining == 0 {
                    return Ok(RunStatus::Done);
                }
                remaining -= 1;
            }

            self.registry.lock().invalidated.clear();

            if let Err(e) = self.poller.poll(&mut events) {
                tracing::error!(error = %e, "error in epoll_wait");
                return Err(Error::Wait(e));
            }

            for event in &events {
                if event.token == WAKE_TOKEN {
                    return Ok(RunStatus::Stopped);
                }

                self.dispatch(event);
            }
        }
    }

    /// Requests the loop to stop.
    ///
    /// Never blocks and may be called from any thread, callbacks included. A
    /// stop requested while the reactor is idle makes its next run return
    /// immediately.
    pub fn stop(&self) {
        self.poller.waker().wake();
    }

    /// Watches `fd` for readability and/or writability.
    ///
    /// # Panics
    ///
    /// Panics if both callbacks are `None`.
    pub fn register(
        &self,
        fd: RawFd,
        on_readable: Option<Callback>,
        on_writable: Option<Callback>,
    ) -> Result<Watch> {
        assert!(
            on_readable.is_some() || on_writable.is_some(),
            "a watch needs at least one callback"
        );

        let interest = Interest {
            read: on_readable.is_some(),
            write: on_writable.is_some(),
        };
        let entry = Arc::new(WatchEntry::new(fd, on_readable, on_writable));

        let mut registry = self.registry.lock();
        let token = registry.watches.insert(entry);

        if let Err(source) = self.poller.register(fd, token, interest) {
            registry.watches.remove(token);
            tracing::error!(fd, error = %source, "unable to register fd");
            return Err(Error::Register { fd, source });
        }

        tracing::trace!(fd, token, "watch registered");

        Ok(Watch {
            reactor: self.id,
            token,
            fd,
        })
    }

    /// Watches `fd` for readability.
    pub fn register_read<F>(&self, fd: RawFd, on_readable: F) -> Result<Watch>
    where
        F: FnMut() + Send + 'static,
    {
        self.register(fd, Some(Box::new(on_readable)), None)
    }

    /// Watches `fd` for writability.
    pub fn register_write<F>(&self, fd: RawFd, on_writable: F) -> Result<Watch>
    where
        F: FnMut() + Send + 'static,
    {
        self.register(fd, None, Some(Box::new(on_writable)))
    }

    /// Stops watching a descriptor.
    ///
    /// From the thread running this reactor the call never blocks, and a
    /// watch removed from its own read callback does not get its write
    /// callback invoked. From any other thread the call returns only once
    /// a callback of this watch that is already running has finished, so it
    /// must not be made from inside that callback.
    ///
    /// # Panics
    ///
    /// Panics if `watch` was registered with another reactor.
    pub fn unregister(&self, watch: Watch) {
        assert_eq!(
            watch.reactor, self.id,
            "watch unregistered from a reactor it does not belong to"
        );

        let on_loop = self.is_loop_thread();

        let entry = {
            let mut registry = self.registry.lock();
            let Some(entry) = registry.watches.remove(watch.token) else {
                return;
            };

            if let Err(e) = self.poller.deregister(entry.fd) {
                tracing::warn!(fd = entry.fd, error = %e, "unable to remove fd from epoll");
            }

            entry.mark_removed();

            if !on_loop {
                registry.invalidated.push(watch.token);
            }
            entry
        };

        tracing::trace!(fd = watch.fd, token = watch.token, "watch unregistered");

        if !on_loop {
            // Wait out a callback that may be running right now.
            drop(entry.callbacks.lock());
        }
    }

    /// Number of descriptors currently watched.
    pub fn watch_count(&self) -> usize {
        self.registry.lock().watches.len()
    }

    /// Whether the calling thread is the one running this reactor.
    pub fn is_loop_thread(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    fn dispatch(&self, event: &Event) {
        let registry = self.registry.lock();

        if registry.invalidated.contains(&event.token) {
            return;
        }

        let Some(entry) = registry.watches.get(event.token).cloned() else {
            return;
        };

        let mut callbacks = entry.callbacks.lock();
        drop(registry);

        if event.readable {
            if let Some(on_readable) = callbacks.on_readable.as_mut() {
                on_readable();
            }
        }

        if event.writable && !entry.is_removed() {
            if let Some(on_writable) = callbacks.on_writable.as_mut() {
                on_writable();
            }
        }
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the running thread for the duration of a run.
struct OwnerGuard<'a> {
    reactor: &'a Reactor,
}

impl<'a> OwnerGuard<'a> {
    fn enter(reactor: &'a Reactor) -> Self {
        let mut owner = reactor.owner.lock();
        assert!(owner.is_none(), "reactor is already running");
        *owner = Some(thread::current().id());

        Self { reactor }
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        *self.reactor.owner.lock() = None;
    }
}
