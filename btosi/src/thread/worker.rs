use crate::error::{Error, Result};
use crate::queue::BoundedChannel;
use crate::reactor::Reactor;
use crate::sync::Completion;
use crate::sys::unix::{sys_gettid, sys_set_fifo, sys_setpriority};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

/// Longest thread name the kernel keeps, terminator excluded.
pub const THREAD_NAME_MAX: usize = 15;

/// Unit of work executed by a [`WorkerThread`].
pub type Work = Box<dyn FnOnce() + Send>;

/// State shared between the handle and the native thread.
struct Shared {
    name: String,
    reactor: Arc<Reactor>,
    queue: Arc<BoundedChannel<Work>>,

    /// Post gate: `true` once the thread no longer accepts work.
    closed: Mutex<bool>,
}

/// Native thread draining a bounded work queue through its own reactor.
///
/// Work items run one at a time, in the order they were posted. The
/// thread's reactor is also available to register further descriptors
/// whose callbacks then run on this thread.
///
/// Dropping a `WorkerThread` stops it and waits for every accepted work item
/// to run.
pub struct WorkerThread {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
    joined: AtomicBool,
    tid: i32,
    thread_id: ThreadId,
}

impl WorkerThread {
    /// Spawns a worker thread named `name` with a work queue of `capacity`.
    ///
    /// Returns once the thread is running.
    ///
    /// # Arguments
    ///
    /// * `name` - Thread name, truncated to [`THREAD_NAME_MAX`] bytes.
    /// * `capacity` - Maximum number of pending work items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(name: &str, capacity: usize) -> Result<Self> {
        assert!(capacity > 0, "work queue capacity must be at least 1");

        let name = truncate_name(name);
        let queue = Arc::new(BoundedChannel::new(capacity)?);

        let shared = Arc::new(Shared {
            name: name.clone(),
            reactor: Arc::new(Reactor::new()),
            queue,
            closed: Mutex::new(false),
        });

        let started: Arc<Completion<(i32, ThreadId)>> = Arc::new(Completion::new());

        let handle = {
            let shared = Arc::clone(&shared);
            let started = Arc::clone(&started);

            thread::Builder::new()
                .name(name.clone())
                .spawn(move || run(shared, started))
                .map_err(|source| {
                    tracing::error!(name = %name, error = %source, "unable to spawn thread");
                    Error::Spawn {
                        name: name.clone(),
                        source,
                    }
                })?
        };

        let Some((tid, thread_id)) = started.wait() else {
            return Err(Error::Panicked { name });
        };

        tracing::debug!(name = %shared.name, tid, "worker thread started");

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
            joined: AtomicBool::new(false),
            tid,
            thread_id,
        })
    }

    /// Queues `work` for execution on this thread.
    ///
    /// Blocks while the work queue is full. Fails once the thread has
    /// drained its queue for the last time; work accepted before that is
    /// always executed.
    pub fn post<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut work: Work = Box::new(work);

        loop {
            {
                let closed = self.shared.closed.lock();
                if *closed {
                    return Err(Error::ThreadStopped {
                        name: self.shared.name.clone(),
                    });
                }

                match self.shared.queue.try_enqueue(work) {
                    Ok(()) => return Ok(()),
                    Err(rejected) => work = rejected,
                }
            }

            self.shared.queue.wait_not_full();
        }
    }

    /// Asks the thread to stop once its reactor returns.
    ///
    /// Never blocks. Work already queued still runs.
    pub fn stop(&self) {
        self.shared.reactor.stop();
    }

    /// Waits for the thread to exit.
    ///
    /// Only the first call waits; later calls return immediately.
    pub fn join(&self) -> Result<()> {
        if self.is_self() {
            return Err(Error::JoinSelf {
                name: self.shared.name.clone(),
            });
        }

        if self.joined.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| Error::Panicked {
                name: self.shared.name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Sets the nice value of the thread.
    pub fn set_priority(&self, priority: i32) -> Result<()> {
        sys_setpriority(self.tid, priority).map_err(|source| Error::Os {
            op: "setpriority",
            source,
        })
    }

    /// Moves the thread to `SCHED_FIFO` with `priority`.
    pub fn set_realtime_priority(&self, priority: i32) -> Result<()> {
        sys_set_fifo(self.tid, priority).map_err(|source| Error::Os {
            op: "sched_setscheduler",
            source,
        })
    }

    /// Whether the caller is running on this worker thread.
    pub fn is_self(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Thread name, as seen by the kernel.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Kernel thread id.
    pub fn tid(&self) -> i32 {
        self.tid
    }

    /// Reactor driving this thread.
    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.shared.reactor
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        self.stop();

        if self.is_self() {
            tracing::warn!(name = %self.shared.name, "worker thread dropped from itself, detaching");
            return;
        }

        if let Err(e) = self.join() {
            tracing::error!(name = %self.shared.name, error = %e, "worker thread did not exit cleanly");
        }
    }
}

impl std::fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerThread")
            .field("name", &self.shared.name)
            .field("tid", &self.tid)
            .finish()
    }
}

/// Closes the post gate when the thread body exits, unwinding included.
struct GateGuard<'a>(&'a Shared);

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        *self.0.closed.lock() = true;
    }
}

fn run(shared: Arc<Shared>, started: Arc<Completion<(i32, ThreadId)>>) {
    started.ready((sys_gettid(), thread::current().id()));
    drop(started);

    let gate = GateGuard(&shared);

    let registered = shared.queue.register_dequeue(&shared.reactor, |queue| {
        if let Some(work) = queue.try_dequeue() {
            work();
        }
    });

    match registered {
        Ok(()) => {
            if let Err(e) = shared.reactor.start() {
                tracing::error!(name = %shared.name, error = %e, "reactor of worker thread failed");
            }
            shared.queue.unregister_dequeue();
        }
        Err(e) => {
            tracing::error!(name = %shared.name, error = %e, "unable to watch work queue");
        }
    }

    // Drain what was queued, but do not let a busy producer keep us alive.
    let capacity = shared.queue.capacity();
    let mut count = 0;
    while count <= capacity {
        let Some(work) = shared.queue.try_dequeue() else {
            break;
        };
        work();
        count += 1;
    }

    if count > capacity {
        tracing::warn!(name = %shared.name, "growing work queue not fully drained");
    }

    drop(gate);

    while let Some(work) = shared.queue.try_dequeue() {
        work();
    }

    tracing::debug!(name = %shared.name, "worker thread exiting");
}

fn truncate_name(name: &str) -> String {
    if name.len() <= THREAD_NAME_MAX {
        return name.to_owned();
    }

    let mut end = THREAD_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_owned()
}
