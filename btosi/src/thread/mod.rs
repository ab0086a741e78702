//! Worker threads.
//!
//! A [`WorkerThread`] owns a native thread, a [`Reactor`](crate::Reactor)
//! and a bounded work queue registered on that reactor.

mod worker;

pub use worker::{THREAD_NAME_MAX, Work, WorkerThread};
