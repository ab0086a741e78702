use crate::error::{Error, Result};
use crate::sys::unix::{sys_close, sys_read_u64, sys_timerfd_create, sys_timerfd_set};

use libc::{CLOCK_BOOTTIME_ALARM, clockid_t};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// One-shot kernel timer armed on absolute boot-time deadlines.
///
/// Backed by a non-blocking `timerfd` that becomes readable when it fires.
pub(crate) struct KernelTimer {
    fd: RawFd,
    clock: clockid_t,
}

impl KernelTimer {
    pub(crate) fn new(clock: clockid_t) -> Result<Self> {
        let fd = sys_timerfd_create(clock).map_err(|source| {
            tracing::error!(clock, error = %source, "unable to create timer");
            if clock == CLOCK_BOOTTIME_ALARM {
                tracing::error!(
                    "CLOCK_BOOTTIME_ALARM needs kernel support and CAP_WAKE_ALARM; \
                     configure another wakeup clock if neither is available"
                );
            }
            Error::TimerCreate { clock, source }
        })?;

        Ok(Self { fd, clock })
    }

    /// Fires once at `deadline`, replacing any previous setting.
    pub(crate) fn arm(&self, deadline: Duration) {
        if let Err(e) = sys_timerfd_set(self.fd, Some(deadline)) {
            tracing::error!(clock = self.clock, error = %e, "unable to set timer");
        }
    }

    pub(crate) fn disarm(&self) {
        if let Err(e) = sys_timerfd_set(self.fd, None) {
            tracing::error!(clock = self.clock, error = %e, "unable to disarm timer");
        }
    }

    /// Consumes pending expirations so the descriptor stops being readable.
    pub(crate) fn drain(&self) {
        match sys_read_u64(self.fd) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => tracing::warn!(clock = self.clock, error = %e, "unable to read timer"),
        }
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for KernelTimer {
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}
