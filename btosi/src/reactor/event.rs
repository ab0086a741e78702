/// An I/O event reported by the poller.
///
/// Readiness information for one registered descriptor, produced by the
/// poller and consumed by the reactor to run the matching callbacks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Event {
    /// Token the descriptor was registered under.
    pub(crate) token: u64,

    /// The descriptor is readable, hung up or in error.
    pub(crate) readable: bool,

    /// The descriptor is writable.
    pub(crate) writable: bool,
}

/// Readiness a watch is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}
