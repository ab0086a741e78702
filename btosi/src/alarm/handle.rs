use super::registry::{AlarmCallback, AlarmQueue};
use super::service::Shared;
use super::stats::AlarmStats;
use crate::error::{Error, Result};
use crate::sys::unix::boot_time;

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A one-shot or periodic timer owned by the caller.
///
/// Created by [`AlarmService::create`](super::AlarmService::create).
/// Dropping the alarm cancels it.
pub struct Alarm {
    id: u64,
    name: String,
    periodic: bool,
    service: Weak<Shared>,
}

impl Alarm {
    pub(crate) fn new(id: u64, name: &str, periodic: bool, service: Weak<Shared>) -> Self {
        Self {
            id,
            name: name.to_owned(),
            periodic,
            service,
        }
    }

    /// Schedules `callback` to run on the default callback thread after
    /// `interval`, and then every `interval` for a periodic alarm.
    ///
    /// Re-setting a scheduled alarm replaces its deadline and callback.
    pub fn set<F>(&self, interval: Duration, callback: F) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let service = self.service()?;
        let queue = Arc::clone(&service.default_queue);
        self.set_on_queue(interval, callback, &queue)
    }

    /// Like [`set`](Self::set), delivering to `queue` instead of the default
    /// callback queue.
    pub fn set_on_queue<F>(&self, interval: Duration, callback: F, queue: &Arc<AlarmQueue>) -> Result<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let service = self.service()?;
        let callback: AlarmCallback = Arc::new(callback);

        let previous = service.set(self.id, interval, callback, queue)?;
        drop(previous);

        tracing::trace!(name = %self.name, interval_ms = interval.as_millis() as u64, "alarm set");
        Ok(())
    }

    /// Cancels the alarm.
    ///
    /// Waits for a running callback of this alarm to return, unless called
    /// from that very callback.
    pub fn cancel(&self) {
        if let Some(service) = self.service.upgrade() {
            drop(service.cancel(self.id));
        }
    }

    /// Whether a callback is pending.
    pub fn is_scheduled(&self) -> bool {
        self.service
            .upgrade()
            .is_some_and(|service| service.lock().alarms.get(&self.id).is_some_and(|s| s.is_scheduled()))
    }

    /// Time left before the next deadline, zero when not scheduled.
    pub fn remaining(&self) -> Duration {
        let Some(service) = self.service.upgrade() else {
            return Duration::ZERO;
        };

        let registry = service.lock();
        match registry.alarms.get(&self.id) {
            Some(state) if state.is_scheduled() => state.deadline.saturating_sub(boot_time()),
            _ => Duration::ZERO,
        }
    }

    /// Snapshot of the scheduling statistics.
    pub fn stats(&self) -> AlarmStats {
        self.service
            .upgrade()
            .and_then(|service| service.lock().alarms.get(&self.id).map(|s| s.stats.clone()))
            .unwrap_or_else(|| AlarmStats::new(&self.name))
    }

    /// Alarm name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the alarm re-arms itself after firing.
    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    fn service(&self) -> Result<Arc<Shared>> {
        self.service.upgrade().ok_or(Error::ServiceShutdown)
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        if let Some(service) = self.service.upgrade() {
            drop(service.cancel(self.id));
            drop(service.remove(self.id));
        }
    }
}

impl fmt::Debug for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alarm")
            .field("name", &self.name)
            .field("periodic", &self.periodic)
            .finish()
    }
}
