use std::time::Duration;

/// Running aggregate of a duration sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Number of samples.
    pub count: usize,
    /// Sum of all samples.
    pub total: Duration,
    /// Largest sample.
    pub max: Duration,
}

impl Stat {
    pub(crate) fn update(&mut self, delta: Duration) {
        self.count += 1;
        self.total += delta;
        self.max = self.max.max(delta);
    }

    /// Mean sample, zero when empty.
    pub fn average(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64),
        }
    }
}

/// Scheduling statistics of one alarm.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmStats {
    /// Alarm name.
    pub name: String,
    /// Number of `set` calls.
    pub scheduled_count: usize,
    /// Number of cancellations of a scheduled alarm.
    pub canceled_count: usize,
    /// Number of automatic re-arms of a periodic alarm.
    pub rescheduled_count: usize,
    /// Number of callback executions.
    pub total_updates: usize,
    /// Boot time of the last callback execution.
    pub last_update: Duration,
    /// Time spent inside the callback.
    pub callback_execution: Stat,
    /// How late callbacks started after their deadline.
    pub overdue_scheduling: Stat,
    /// How early callbacks started before their deadline.
    pub premature_scheduling: Stat,
}

impl AlarmStats {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Records one callback execution that started at `now`.
    pub(crate) fn record_execution(&mut self, now: Duration, deadline: Duration, execution: Duration) {
        self.total_updates += 1;
        self.last_update = now;
        self.callback_execution.update(execution);

        if deadline < now {
            self.overdue_scheduling.update(now - deadline);
        } else if deadline > now {
            self.premature_scheduling.update(deadline - now);
        }
    }
}
