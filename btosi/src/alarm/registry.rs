use super::stats::AlarmStats;
use crate::queue::BoundedChannel;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

/// Callback run when an alarm fires.
pub type AlarmCallback = Arc<dyn Fn() + Send + Sync>;

/// Alarm handed to a processing queue, waiting for its callback to run.
///
/// Carries the arming it was dispatched for; an alarm re-set or canceled
/// since then no longer matches and the entry is discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAlarm {
    pub(crate) id: u64,
    pub(crate) seq: u64,
}

/// Queue alarms are delivered through.
///
/// Register it on a worker thread with
/// [`AlarmService::register_processing_queue`](super::AlarmService::register_processing_queue)
/// to run callbacks there.
pub type AlarmQueue = BoundedChannel<PendingAlarm>;

/// Mutable state of one alarm, guarded by the registry lock.
pub(crate) struct AlarmState {
    pub(crate) periodic: bool,
    pub(crate) creation_time: Duration,
    pub(crate) period: Duration,
    pub(crate) deadline: Duration,
    pub(crate) prev_deadline: Duration,
    pub(crate) callback: Option<AlarmCallback>,
    pub(crate) queue: Option<Arc<AlarmQueue>>,

    /// Bumped by every `set` and `cancel`.
    pub(crate) seq: u64,

    /// Thread currently running the callback.
    pub(crate) running_on: Option<ThreadId>,
    pub(crate) stats: AlarmStats,
}

impl AlarmState {
    pub(crate) fn new(name: &str, periodic: bool) -> Self {
        Self {
            periodic,
            creation_time: Duration::ZERO,
            period: Duration::ZERO,
            deadline: Duration::ZERO,
            prev_deadline: Duration::ZERO,
            callback: None,
            queue: None,
            seq: 0,
            running_on: None,
            stats: AlarmStats::new(name),
        }
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.callback.is_some()
    }

    /// Next deadline after `now`.
    ///
    /// Periodic alarms stay in phase with their creation time: a late
    /// dispatch skips whole periods instead of drifting.
    pub(crate) fn next_deadline(&self, now: Duration) -> Duration {
        let mut into_period = Duration::ZERO;

        if self.periodic && !self.period.is_zero() {
            let elapsed = now.saturating_sub(self.creation_time).as_nanos();
            let rem = elapsed % self.period.as_nanos();
            into_period = Duration::from_nanos(rem as u64);
        }

        now + (self.period - into_period)
    }
}

/// Every alarm known to the service, plus the deadline-ordered schedule.
pub(crate) struct Registry {
    pub(crate) alarms: HashMap<u64, AlarmState>,

    /// Scheduled alarms by ascending deadline; ties keep insertion order.
    schedule: Vec<(Duration, u64)>,

    /// The non-wake timer is armed, and the wake lock held.
    pub(crate) timer_set: bool,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            alarms: HashMap::new(),
            schedule: Vec::new(),
            timer_set: false,
        }
    }

    /// Inserts `id` after every entry due no later than `deadline`.
    pub(crate) fn insert(&mut self, id: u64, deadline: Duration) {
        let at = self.schedule.partition_point(|&(d, _)| d <= deadline);
        self.schedule.insert(at, (deadline, id));
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.schedule.retain(|&(_, queued)| queued != id);
    }

    /// Earliest scheduled entry.
    pub(crate) fn front(&self) -> Option<(Duration, u64)> {
        self.schedule.first().copied()
    }

    pub(crate) fn is_front(&self, id: u64) -> bool {
        self.front().is_some_and(|(_, front)| front == id)
    }

    /// Takes the earliest entry if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: Duration) -> Option<u64> {
        match self.front() {
            Some((deadline, id)) if deadline <= now => {
                self.schedule.remove(0);
                Some(id)
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn order(&self) -> Vec<u64> {
        self.schedule.iter().map(|&(_, id)| id).collect()
    }
}
