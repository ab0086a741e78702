use super::service::AlarmService;
use super::wakelock::{NoopWakeLock, WakeLock};
use crate::error::Result;

use libc::{CLOCK_BOOTTIME_ALARM, clockid_t};
use std::time::Duration;

/// Deadlines closer than this keep the system awake instead of relying on
/// the wakeup clock.
pub const DEFAULT_WAKE_LOCK_THRESHOLD: Duration = Duration::from_secs(3);

/// Realtime priority given to the alarm threads by default.
pub const DEFAULT_REALTIME_PRIORITY: i32 = 1;

/// Capacity of the default callback queue.
pub const DEFAULT_CALLBACK_QUEUE_CAPACITY: usize = u32::MAX as usize;

/// Builder for configuring and creating an [`AlarmService`].
///
/// # Examples
///
/// ```rust,ignore
/// let alarms = AlarmService::builder()
///     .wakeup_clock(libc::CLOCK_BOOTTIME)
///     .realtime_priority(None)
///     .build()?;
/// ```
pub struct AlarmServiceBuilder {
    pub(crate) wake_lock_threshold: Duration,
    pub(crate) wakeup_clock: clockid_t,
    pub(crate) callback_thread_name: String,
    pub(crate) dispatcher_thread_name: String,
    pub(crate) realtime_priority: Option<i32>,
    pub(crate) callback_queue_capacity: usize,
    pub(crate) wake_lock: Box<dyn WakeLock>,
}

impl AlarmServiceBuilder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self {
            wake_lock_threshold: DEFAULT_WAKE_LOCK_THRESHOLD,
            wakeup_clock: CLOCK_BOOTTIME_ALARM,
            callback_thread_name: "alarm_callbacks".to_owned(),
            dispatcher_thread_name: "alarm_dispatch".to_owned(),
            realtime_priority: Some(DEFAULT_REALTIME_PRIORITY),
            callback_queue_capacity: DEFAULT_CALLBACK_QUEUE_CAPACITY,
            wake_lock: Box::new(NoopWakeLock),
        }
    }

    /// Sets how close a deadline must be to hold the wake lock.
    pub fn wake_lock_threshold(mut self, threshold: Duration) -> Self {
        self.wake_lock_threshold = threshold;
        self
    }

    /// Sets the clock of the timer used for distant deadlines.
    ///
    /// Defaults to `CLOCK_BOOTTIME_ALARM`, which needs `CAP_WAKE_ALARM`.
    pub fn wakeup_clock(mut self, clock: clockid_t) -> Self {
        self.wakeup_clock = clock;
        self
    }

    /// Sets the name of the default callback thread.
    pub fn callback_thread_name(mut self, name: impl Into<String>) -> Self {
        self.callback_thread_name = name.into();
        self
    }

    /// Sets the name of the dispatcher thread.
    pub fn dispatcher_thread_name(mut self, name: impl Into<String>) -> Self {
        self.dispatcher_thread_name = name.into();
        self
    }

    /// Sets the `SCHED_FIFO` priority of both alarm threads, or `None` to
    /// leave their scheduling alone.
    pub fn realtime_priority(mut self, priority: Option<i32>) -> Self {
        self.realtime_priority = priority;
        self
    }

    /// Sets the capacity of the default callback queue.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn callback_queue_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "callback queue capacity must be at least 1");
        self.callback_queue_capacity = capacity;
        self
    }

    /// Sets the wake lock taken while a deadline is imminent.
    pub fn wake_lock<W>(mut self, wake_lock: W) -> Self
    where
        W: WakeLock + 'static,
    {
        self.wake_lock = Box::new(wake_lock);
        self
    }

    /// Builds the service and starts its threads.
    pub fn build(self) -> Result<AlarmService> {
        AlarmService::from_builder(self)
    }
}

impl Default for AlarmServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
