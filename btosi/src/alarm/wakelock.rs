use crate::error::Result;

/// Keeps the system awake while an alarm is imminent.
///
/// The alarm service takes the lock when the next deadline is closer than
/// its wake-lock threshold and releases it once nothing is due soon.
/// Calls are made with the alarm registry locked and must not block for
/// long.
pub trait WakeLock: Send + Sync {
    /// Takes the lock.
    fn acquire(&self) -> Result<()>;

    /// Releases the lock.
    fn release(&self) -> Result<()>;
}

/// Wake lock that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWakeLock;

impl WakeLock for NoopWakeLock {
    fn acquire(&self) -> Result<()> {
        Ok(())
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }
}
