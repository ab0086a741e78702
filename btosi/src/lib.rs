//! # btosi
//!
//! **btosi** is the concurrency and event-dispatch layer of a Bluetooth host
//! stack. It provides the threads, queues and timers that the protocol
//! layers run on, with no async runtime: every component is a native thread
//! blocked in `epoll_wait`.
//!
//! - [`Reactor`]: an epoll loop running read/write callbacks for watched
//!   descriptors, stoppable from any thread
//! - [`BoundedChannel`]: a bounded FIFO gated by two `eventfd` semaphores,
//!   so either side can be watched by a reactor
//! - [`WorkerThread`]: a native thread executing posted closures in order
//!   through its own reactor
//! - [`AlarmService`] and [`Alarm`]: one-shot and periodic timers on boot
//!   time, dispatched onto worker threads
//! - [`StateMachine`]: closure-based states running on a worker thread
//! - [`RingBuffer`]: a fixed-size byte ring
//!
//! Linux only.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use btosi::WorkerThread;
//!
//! let worker = WorkerThread::new("hci_rx", 64)?;
//! worker.post(|| println!("running on hci_rx"))?;
//! worker.stop();
//! worker.join()?;
//! ```
//!
//! Nothing installs a `tracing` subscriber; the host application decides
//! where logs go.

mod alarm;
mod error;
mod queue;
mod reactor;
mod statemachine;
mod sync;
mod sys;
mod thread;
mod utils;

pub use alarm::{
    Alarm, AlarmCallback, AlarmQueue, AlarmService, AlarmServiceBuilder, AlarmStats,
    DEFAULT_CALLBACK_QUEUE_CAPACITY, DEFAULT_REALTIME_PRIORITY, DEFAULT_WAKE_LOCK_THRESHOLD,
    NoopWakeLock, PendingAlarm, Stat, WakeLock,
};
pub use error::{Error, Result};
pub use queue::BoundedChannel;
pub use reactor::{Callback, Reactor, RunStatus, Watch};
pub use statemachine::{Handler, HandlerTable, SmMessage, StateContext, StateMachine};
pub use sync::{Completion, Semaphore};
pub use thread::{THREAD_NAME_MAX, Work, WorkerThread};
pub use utils::RingBuffer;

/// Maximum number of readiness events handled per reactor iteration.
pub const MAX_EVENTS: usize = sys::epoll::MAX_EVENTS;
