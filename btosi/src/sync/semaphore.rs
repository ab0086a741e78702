use crate::error::{Error, Result};
use crate::sys::unix::{
    sys_close, sys_eventfd_semaphore, sys_poll_readable, sys_read_u64, sys_write_u64,
};

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Counting semaphore backed by an `eventfd` in semaphore mode.
///
/// The descriptor is readable whenever a permit is available, which lets a
/// reactor wait on a semaphore like on any other descriptor. Blocking
/// operations park in `poll(2)`; the descriptor itself stays non-blocking.
pub struct Semaphore {
    fd: RawFd,
}

impl Semaphore {
    /// Creates a semaphore holding `value` permits.
    pub fn new(value: usize) -> Result<Self> {
        let fd = sys_eventfd_semaphore(value as u64).map_err(|source| Error::Os {
            op: "eventfd",
            source,
        })?;

        Ok(Self { fd })
    }

    /// Takes one permit, blocking until one is available.
    ///
    /// # Panics
    ///
    /// Panics if the descriptor cannot be read, since no permit can be
    /// taken from it anymore.
    pub fn wait(&self) {
        loop {
            match sys_read_u64(self.fd) {
                Ok(_) => return,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(fd = self.fd, error = %e, "unable to wait on semaphore");
                    panic!("semaphore wait failed on fd {}: {e}", self.fd);
                }
            }

            self.wait_available();
        }
    }

    /// Takes one permit if available, without blocking.
    pub fn try_wait(&self) -> bool {
        match sys_read_u64(self.fd) {
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) => {
                tracing::error!(fd = self.fd, error = %e, "unable to try-wait on semaphore");
                false
            }
        }
    }

    /// Releases one permit.
    pub fn post(&self) {
        if let Err(e) = sys_write_u64(self.fd, 1) {
            tracing::error!(fd = self.fd, error = %e, "unable to post to semaphore");
        }
    }

    /// Blocks until a permit could be taken, without taking it.
    ///
    /// Another thread may still win the permit once this returns.
    pub fn wait_available(&self) {
        if let Err(e) = sys_poll_readable(self.fd, None) {
            tracing::error!(fd = self.fd, error = %e, "unable to poll semaphore");
        }
    }

    /// Like [`wait_available`](Self::wait_available), giving up after
    /// `timeout`.
    ///
    /// Returns `true` if a permit looked available.
    pub fn wait_available_timeout(&self, timeout: Duration) -> bool {
        match sys_poll_readable(self.fd, Some(timeout)) {
            Ok(ready) => ready,
            Err(e) => {
                tracing::error!(fd = self.fd, error = %e, "unable to poll semaphore");
                false
            }
        }
    }

    /// Pollable descriptor, readable while a permit is available.
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}

impl std::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Semaphore").field("fd", &self.fd).finish()
    }
}
