use super::builder::AlarmServiceBuilder;
use super::handle::Alarm;
use super::registry::{AlarmCallback, AlarmQueue, AlarmState, PendingAlarm, Registry};
use super::timer::KernelTimer;
use super::wakelock::WakeLock;
use crate::error::{Error, Result};
use crate::reactor::Watch;
use crate::sync::Semaphore;
use crate::sys::unix::boot_time;
use crate::thread::WorkerThread;

use libc::CLOCK_BOOTTIME;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// Work queue capacity of the dispatcher and default callback threads.
const ALARM_THREAD_CAPACITY: usize = 128;

/// How long the dispatcher waits on a full processing queue before checking
/// whether the alarm it holds is still wanted.
const FULL_QUEUE_RECHECK: Duration = Duration::from_millis(50);

/// State shared by the service, its threads and every alarm handle.
pub(crate) struct Shared {
    registry: Mutex<Registry>,

    /// Signalled whenever a callback returns.
    callback_done: Condvar,

    /// Posted when the front of the schedule may be due.
    expired: Semaphore,
    timer: KernelTimer,
    wakeup_timer: KernelTimer,
    wake_lock: Box<dyn WakeLock>,
    wake_lock_threshold: Duration,

    active: AtomicBool,
    next_id: AtomicU64,
    pub(crate) default_queue: Arc<AlarmQueue>,
}

/// Owner of the alarm machinery.
///
/// The service runs two threads: a dispatcher that reacts to the kernel
/// timers and hands due alarms to their processing queue, and a default
/// callback thread that runs callbacks of alarms set with
/// [`Alarm::set`]. Further queues can be attached to any
/// [`WorkerThread`] with
/// [`register_processing_queue`](Self::register_processing_queue).
///
/// Dropping the service shuts it down.
pub struct AlarmService {
    shared: Arc<Shared>,
    callback_thread: WorkerThread,
    dispatcher: WorkerThread,
    watches: Mutex<Vec<Watch>>,
}

impl AlarmService {
    /// Starts configuring a service.
    pub fn builder() -> AlarmServiceBuilder {
        AlarmServiceBuilder::new()
    }

    pub(crate) fn from_builder(builder: AlarmServiceBuilder) -> Result<Self> {
        let timer = KernelTimer::new(CLOCK_BOOTTIME)?;
        let wakeup_timer = KernelTimer::new(builder.wakeup_clock)?;
        let expired = Semaphore::new(0)?;
        let default_queue = Arc::new(AlarmQueue::new(builder.callback_queue_capacity)?);

        let shared = Arc::new(Shared {
            registry: Mutex::new(Registry::new()),
            callback_done: Condvar::new(),
            expired,
            timer,
            wakeup_timer,
            wake_lock: builder.wake_lock,
            wake_lock_threshold: builder.wake_lock_threshold,
            active: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            default_queue,
        });

        let callback_thread = WorkerThread::new(&builder.callback_thread_name, ALARM_THREAD_CAPACITY)?;
        apply_priority(&callback_thread, builder.realtime_priority);
        attach_queue(&shared, &shared.default_queue, &callback_thread)?;

        let dispatcher = WorkerThread::new(&builder.dispatcher_thread_name, ALARM_THREAD_CAPACITY)?;
        apply_priority(&dispatcher, builder.realtime_priority);

        let watches = watch_timers(&shared, &dispatcher)?;

        tracing::debug!(
            wakeup_clock = builder.wakeup_clock,
            threshold_ms = builder.wake_lock_threshold.as_millis() as u64,
            "alarm service started"
        );

        Ok(Self {
            shared,
            callback_thread,
            dispatcher,
            watches: Mutex::new(watches),
        })
    }

    /// Creates an unscheduled alarm.
    pub fn create(&self, name: &str, periodic: bool) -> Alarm {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        self.shared
            .registry
            .lock()
            .alarms
            .insert(id, AlarmState::new(name, periodic));

        Alarm::new(id, name, periodic, Arc::downgrade(&self.shared))
    }

    /// Runs callbacks of alarms delivered to `queue` on `thread`.
    pub fn register_processing_queue(&self, queue: &Arc<AlarmQueue>, thread: &WorkerThread) -> Result<()> {
        attach_queue(&self.shared, queue, thread)
    }

    /// Detaches `queue` from its thread and cancels every alarm targeting it.
    pub fn unregister_processing_queue(&self, queue: &Arc<AlarmQueue>) {
        queue.unregister_dequeue();

        let mut dropped = Vec::new();
        {
            let mut registry = self.shared.registry.lock();

            let targeting: Vec<u64> = registry
                .alarms
                .iter()
                .filter(|(_, state)| state.queue.as_ref().is_some_and(|q| Arc::ptr_eq(q, queue)))
                .map(|(&id, _)| id)
                .collect();

            for id in targeting {
                dropped.extend(self.shared.cancel_locked(&mut registry, id));
            }
        }

        queue.clear();
        drop(dropped);
    }

    /// The queue served by the default callback thread.
    pub fn default_queue(&self) -> &Arc<AlarmQueue> {
        &self.shared.default_queue
    }

    /// Stops both threads, disarms the timers and releases the wake lock.
    ///
    /// Alarms can no longer be set afterwards. Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.active.swap(false, Ordering::AcqRel) {
            return;
        }

        self.dispatcher.stop();
        if let Err(e) = self.dispatcher.join() {
            tracing::error!(error = %e, "alarm dispatcher did not exit cleanly");
        }

        for watch in self.watches.lock().drain(..) {
            self.dispatcher.reactor().unregister(watch);
        }

        self.callback_thread.stop();
        if let Err(e) = self.callback_thread.join() {
            tracing::error!(error = %e, "alarm callback thread did not exit cleanly");
        }

        let mut registry = self.shared.registry.lock();
        self.shared.timer.disarm();
        self.shared.wakeup_timer.disarm();

        if registry.timer_set {
            registry.timer_set = false;
            self.shared.release_wake_lock();
        }

        tracing::debug!("alarm service shut down");
    }
}

impl Drop for AlarmService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock()
    }

    /// Schedules alarm `id` to call `callback` on `queue` after `interval`.
    ///
    /// Returns the callback previously set, to be dropped by the caller
    /// once no lock is held.
    pub(crate) fn set(
        &self,
        id: u64,
        interval: Duration,
        callback: AlarmCallback,
        queue: &Arc<AlarmQueue>,
    ) -> Result<Option<AlarmCallback>> {
        if !self.active.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }

        let now = boot_time();
        if now.checked_add(interval).is_none() {
            return Err(Error::IntervalOutOfRange(interval));
        }

        let mut registry = self.registry.lock();
        let Some(state) = registry.alarms.get(&id) else {
            return Err(Error::ServiceShutdown);
        };
        if state.periodic && interval.is_zero() {
            return Err(Error::IntervalOutOfRange(interval));
        }

        let was_front = registry.is_front(id);
        self.remove_pending(&mut registry, id);

        let previous = registry.alarms.get_mut(&id).and_then(|state| {
            state.creation_time = now;
            state.period = interval;
            state.queue = Some(Arc::clone(queue));
            state.seq += 1;
            state.stats.scheduled_count += 1;
            state.callback.replace(callback)
        });

        self.schedule_next_instance(&mut registry, id, was_front);
        Ok(previous)
    }

    /// Cancels alarm `id` and waits for a callback of it that is running on
    /// another thread.
    pub(crate) fn cancel(&self, id: u64) -> Option<AlarmCallback> {
        let mut registry = self.registry.lock();
        let previous = self.cancel_locked(&mut registry, id);

        let me = thread::current().id();
        loop {
            match registry.alarms.get(&id).and_then(|state| state.running_on) {
                Some(running) if running != me => self.callback_done.wait(&mut registry),
                _ => break,
            }
        }

        previous
    }

    /// Forgets alarm `id` entirely.
    pub(crate) fn remove(&self, id: u64) -> Option<AlarmState> {
        self.registry.lock().alarms.remove(&id)
    }

    pub(crate) fn cancel_locked(&self, registry: &mut Registry, id: u64) -> Option<AlarmCallback> {
        let was_front = registry.is_front(id);
        self.remove_pending(registry, id);

        let previous = registry.alarms.get_mut(&id).and_then(|state| {
            let previous = state.callback.take();
            if previous.is_some() {
                state.stats.canceled_count += 1;
            }
            state.deadline = Duration::ZERO;
            state.prev_deadline = Duration::ZERO;
            state.queue = None;
            state.seq += 1;
            previous
        });

        if was_front {
            self.reschedule_root(registry);
        }

        previous
    }

    /// Drops `id` from the schedule and from the queue it was handed to.
    fn remove_pending(&self, registry: &mut Registry, id: u64) {
        registry.remove(id);

        if let Some(queue) = registry.alarms.get(&id).and_then(|state| state.queue.as_ref()) {
            while queue.remove_where(|pending| pending.id == id).is_some() {}
        }
    }

    fn schedule_next_instance(&self, registry: &mut Registry, id: u64, was_front: bool) {
        let now = boot_time();

        let Some(state) = registry.alarms.get_mut(&id) else {
            return;
        };
        let deadline = state.next_deadline(now);
        state.deadline = deadline;

        registry.insert(id, deadline);

        if was_front || registry.is_front(id) {
            self.reschedule_root(registry);
        }
    }

    /// Programs the kernel timers for the front of the schedule.
    fn reschedule_root(&self, registry: &mut Registry) {
        let was_set = registry.timer_set;
        let mut timer_deadline = None;

        match registry.front() {
            None => self.wakeup_timer.disarm(),
            Some((deadline, _)) => {
                let now = boot_time();

                if deadline.saturating_sub(now) < self.wake_lock_threshold {
                    if !was_set {
                        if let Err(e) = self.wake_lock.acquire() {
                            tracing::error!(error = %e, "unable to acquire wake lock");
                        }
                    }
                    timer_deadline = Some(deadline);
                    self.wakeup_timer.disarm();
                } else {
                    self.wakeup_timer.arm(deadline);
                }

                if deadline <= now {
                    self.expired.post();
                }

                tracing::trace!(deadline_ms = deadline.as_millis() as u64, "root alarm rescheduled");
            }
        }

        registry.timer_set = timer_deadline.is_some();
        if was_set && !registry.timer_set {
            self.release_wake_lock();
        }

        match timer_deadline {
            Some(deadline) => self.timer.arm(deadline),
            None => self.timer.disarm(),
        }
    }

    fn release_wake_lock(&self) {
        if let Err(e) = self.wake_lock.release() {
            tracing::error!(error = %e, "unable to release wake lock");
        }
    }

    /// Hands every due alarm to its processing queue.
    ///
    /// Runs on the dispatcher thread each time `expired` is taken. Due
    /// alarms are collected under the registry lock and enqueued once it is
    /// released, so a full queue never blocks its own consumer.
    fn dispatch(&self) {
        if !self.active.load(Ordering::Acquire) {
            return;
        }

        let mut due = Vec::new();
        {
            let mut registry = self.registry.lock();
            let now = boot_time();

            while let Some(id) = registry.pop_due(now) {
                let Some(state) = registry.alarms.get_mut(&id) else {
                    continue;
                };
                let Some(queue) = state.queue.clone() else {
                    continue;
                };
                let pending = PendingAlarm { id, seq: state.seq };

                if state.periodic {
                    state.prev_deadline = state.deadline;
                    state.stats.rescheduled_count += 1;
                    self.schedule_next_instance(&mut registry, id, false);
                }

                due.push((pending, queue));
            }

            self.reschedule_root(&mut registry);
        }

        for (pending, queue) in due {
            tracing::trace!(alarm = pending.id, "alarm expired");
            self.deliver(pending, &queue);
        }
    }

    /// Enqueues `pending`, waiting for room while the alarm is still armed
    /// as dispatched and the service is running.
    fn deliver(&self, mut pending: PendingAlarm, queue: &AlarmQueue) {
        loop {
            match queue.try_enqueue(pending) {
                Ok(()) => return,
                Err(rejected) => pending = rejected,
            }

            if !self.active.load(Ordering::Acquire) || !self.is_current(pending) {
                tracing::debug!(alarm = pending.id, "dropping expired alarm for a full queue");
                return;
            }

            queue.wait_not_full_timeout(FULL_QUEUE_RECHECK);
        }
    }

    /// Whether `pending` still belongs to the alarm's current arming.
    fn is_current(&self, pending: PendingAlarm) -> bool {
        self.registry
            .lock()
            .alarms
            .get(&pending.id)
            .is_some_and(|state| state.seq == pending.seq)
    }

    /// Runs the callback of the next alarm waiting in `queue`.
    fn process(&self, queue: &AlarmQueue) {
        let mut registry = self.registry.lock();

        let Some(PendingAlarm { id, seq }) = queue.try_dequeue() else {
            return;
        };
        let Some(state) = registry.alarms.get_mut(&id) else {
            return;
        };
        if state.seq != seq {
            tracing::trace!(alarm = id, "stale expired alarm discarded");
            return;
        }

        let (callback, deadline) = if state.periodic {
            // Already re-armed by the dispatcher.
            (state.callback.clone(), state.prev_deadline)
        } else {
            let deadline = state.deadline;
            state.deadline = Duration::ZERO;
            state.queue = None;
            (state.callback.take(), deadline)
        };

        let Some(callback) = callback else {
            return;
        };

        state.running_on = Some(thread::current().id());
        drop(registry);

        let started = boot_time();
        callback();
        let finished = boot_time();

        let mut registry = self.registry.lock();
        if let Some(state) = registry.alarms.get_mut(&id) {
            state.running_on = None;
            state
                .stats
                .record_execution(started, deadline, finished.saturating_sub(started));
        }
        drop(registry);

        self.callback_done.notify_all();
        drop(callback);
    }
}

fn apply_priority(thread: &WorkerThread, priority: Option<i32>) {
    let Some(priority) = priority else {
        return;
    };

    if let Err(e) = thread.set_realtime_priority(priority) {
        tracing::warn!(name = thread.name(), priority, error = %e, "unable to set realtime priority");
    }
}

fn attach_queue(shared: &Arc<Shared>, queue: &Arc<AlarmQueue>, thread: &WorkerThread) -> Result<()> {
    let weak: Weak<Shared> = Arc::downgrade(shared);

    queue.register_dequeue(thread.reactor(), move |queue| {
        if let Some(shared) = weak.upgrade() {
            shared.process(queue);
        }
    })
}

/// Watches `expired` and both kernel timers on the dispatcher's reactor.
fn watch_timers(shared: &Arc<Shared>, dispatcher: &WorkerThread) -> Result<Vec<Watch>> {
    let reactor = dispatcher.reactor();
    let mut watches = Vec::with_capacity(3);

    let weak = Arc::downgrade(shared);
    watches.push(reactor.register_read(shared.expired.fd(), move || {
        if let Some(shared) = weak.upgrade() {
            if shared.expired.try_wait() {
                shared.dispatch();
            }
        }
    })?);

    for wakeup in [false, true] {
        let weak = Arc::downgrade(shared);
        let fd = if wakeup {
            shared.wakeup_timer.fd()
        } else {
            shared.timer.fd()
        };

        let watch = reactor.register_read(fd, move || {
            if let Some(shared) = weak.upgrade() {
                let timer = if wakeup { &shared.wakeup_timer } else { &shared.timer };
                timer.drain();
                shared.expired.post();
            }
        });

        match watch {
            Ok(watch) => watches.push(watch),
            Err(e) => {
                for watch in watches {
                    reactor.unregister(watch);
                }
                return Err(e);
            }
        }
    }

    Ok(watches)
}
