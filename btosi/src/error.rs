//! Error types used across the runtime.
//!
//! Contract violations (unregistering a watch on the wrong reactor, calling
//! [`Completion::ready`](crate::sync::Completion::ready) twice, ...) are not
//! represented here: they panic. Everything in this module is a failure the
//! caller can observe and decide about.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias used by every fallible operation in the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the reactor, worker threads and the alarm service.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// A system call failed.
    #[error("{op} failed: {source}")]
    Os {
        /// Name of the failing operation.
        op: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A descriptor could not be added to the epoll interest set.
    #[error("unable to register fd {fd} with epoll: {source}")]
    Register {
        /// The descriptor that was rejected.
        fd: i32,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// `epoll_wait` failed while the reactor was running.
    #[error("error in epoll_wait: {0}")]
    Wait(#[source] io::Error),

    /// The native thread could not be spawned.
    #[error("unable to spawn thread {name}: {source}")]
    Spawn {
        /// Requested thread name.
        name: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A kernel timer could not be created for the given clock.
    #[error("unable to create timer with clock {clock}: {source}")]
    TimerCreate {
        /// The clock id passed to `timerfd_create`.
        clock: i32,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The worker thread has finished draining its queue and no longer accepts work.
    #[error("thread {name} is stopped")]
    ThreadStopped {
        /// Name of the stopped thread.
        name: String,
    },

    /// `join` was called from the thread being joined.
    #[error("thread {name} cannot join itself")]
    JoinSelf {
        /// Name of the thread.
        name: String,
    },

    /// The worker thread panicked while running a work item.
    #[error("thread {name} panicked")]
    Panicked {
        /// Name of the thread.
        name: String,
    },

    /// The alarm service backing an alarm has been shut down.
    #[error("alarm service is shut down")]
    ServiceShutdown,

    /// The wake lock could not be taken or released.
    #[error("wake lock {action} failed: {reason}")]
    WakeLock {
        /// `"acquire"` or `"release"`.
        action: &'static str,
        /// Human readable reason.
        reason: String,
    },

    /// A requested interval cannot be represented by the kernel timer.
    #[error("interval {0:?} is out of range")]
    IntervalOutOfRange(Duration),
}

impl Error {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            Error::Os { .. } => "os_error",
            Error::Register { .. } => "register_failed",
            Error::Wait(_) => "wait_failed",
            Error::Spawn { .. } => "spawn_failed",
            Error::TimerCreate { .. } => "timer_create_failed",
            Error::ThreadStopped { .. } => "thread_stopped",
            Error::JoinSelf { .. } => "join_self",
            Error::Panicked { .. } => "thread_panicked",
            Error::ServiceShutdown => "service_shutdown",
            Error::WakeLock { .. } => "wake_lock_failed",
            Error::IntervalOutOfRange(_) => "interval_out_of_range",
        }
    }
}
