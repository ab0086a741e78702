use parking_lot::Mutex;
use std::fmt;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};

/// Callback invoked by the reactor when a watched descriptor is ready.
pub type Callback = Box<dyn FnMut() + Send>;

/// Handle returned by [`Reactor::register`](super::Reactor::register).
///
/// A `Watch` identifies one registration. It is consumed by
/// [`Reactor::unregister`](super::Reactor::unregister), and dropping it
/// without unregistering leaves the descriptor watched until the reactor
/// itself is dropped.
pub struct Watch {
    pub(crate) reactor: u64,
    pub(crate) token: u64,
    pub(crate) fd: RawFd,
}

impl Watch {
    /// The watched descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("fd", &self.fd)
            .field("token", &self.token)
            .finish()
    }
}

/// Reactor-side state of a watch.
pub(crate) struct WatchEntry {
    pub(crate) fd: RawFd,

    /// Object lock, held for the whole time the callbacks run.
    pub(crate) callbacks: Mutex<Callbacks>,

    /// Set once the watch is unregistered; suppresses the write callback
    /// when removal happens from inside the read callback.
    removed: AtomicBool,
}

pub(crate) struct Callbacks {
    pub(crate) on_readable: Option<Callback>,
    pub(crate) on_writable: Option<Callback>,
}

impl WatchEntry {
    pub(crate) fn new(fd: RawFd, on_readable: Option<Callback>, on_writable: Option<Callback>) -> Self {
        Self {
            fd,
            callbacks: Mutex::new(Callbacks {
                on_readable,
                on_writable,
            }),
            removed: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}
