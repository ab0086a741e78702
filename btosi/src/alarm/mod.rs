//! Alarms: one-shot and periodic timers dispatched onto worker threads.
//!
//! An [`AlarmService`] keeps every scheduled alarm in a registry ordered by
//! deadline (boot time, so suspend counts). Two kernel timers track the
//! earliest deadline:
//! - a `CLOCK_BOOTTIME` timer for deadlines closer than the wake-lock
//!   threshold, armed while the [`WakeLock`] is held;
//! - a wakeup timer (by default `CLOCK_BOOTTIME_ALARM`) for later ones, able
//!   to resume a suspended system.
//!
//! When either fires, the dispatcher thread pops every due alarm, re-arms the
//! periodic ones and pushes each into its [`AlarmQueue`]. The worker thread
//! serving that queue runs the callback with no lock held.
//!
//! ```rust,ignore
//! let alarms = AlarmService::builder().build()?;
//! let alarm = alarms.create("ping", true);
//! alarm.set(Duration::from_millis(100), || println!("ping"))?;
//! ```

mod builder;
mod handle;
mod registry;
mod service;
mod stats;
mod timer;
mod wakelock;

pub use builder::{
    AlarmServiceBuilder, DEFAULT_CALLBACK_QUEUE_CAPACITY, DEFAULT_REALTIME_PRIORITY,
    DEFAULT_WAKE_LOCK_THRESHOLD,
};
pub use handle::Alarm;
pub use registry::{AlarmCallback, AlarmQueue, PendingAlarm};
pub use service::AlarmService;
pub use stats::{AlarmStats, Stat};
pub use wakelock::{NoopWakeLock, WakeLock};
