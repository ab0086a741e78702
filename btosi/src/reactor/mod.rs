//! Reactor core and event handling.
//!
//! The reactor multiplexes file descriptors with `epoll` and runs the read
//! and write callbacks registered for them. It is the building block of
//! every [`WorkerThread`](crate::WorkerThread): a worker's loop is a reactor
//! whose only watch is the dequeue side of its work queue.
//!
//! Watches live in a generation-checked slab, so an event fetched before a
//! watch was removed can never reach a newer registration reusing the slot.

mod core;
mod watch;

pub(crate) mod event;

pub use self::core::{Reactor, RunStatus};
pub use watch::{Callback, Watch};
