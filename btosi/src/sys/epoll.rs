//! Linux `epoll`-based poller.
//!
//! Responsibilities:
//! - Register file descriptors with read/write interests
//! - Block waiting for I/O readiness
//! - Report the stop signal raised through the wake-up `eventfd`
//!
//! The poller is level-triggered: a descriptor that stays readable keeps
//! being reported until its owner drains it.

use super::unix::{sys_close, sys_eventfd, sys_read_u64, sys_write_u64};
use crate::reactor::event::{Event, Interest};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP,
    epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::mem;
use std::os::fd::RawFd;

/// Maximum number of readiness events handled per wait.
pub(crate) const MAX_EVENTS: usize = 64;

/// Reserved token used for the wake-up event.
///
/// Tokens produced by the reactor slab carry a non-zero generation in their
/// upper half, so `u64::MAX` never collides with them.
pub(crate) const WAKE_TOKEN: u64 = u64::MAX;

/// Handle to the wake-up `eventfd` of a poller.
///
/// Writing to it makes a blocked `epoll_wait` return with [`WAKE_TOKEN`].
pub(crate) struct Waker(RawFd);

impl Waker {
    /// Wakes the poller.
    ///
    /// Never blocks; the value is left pending if nobody is waiting, so the
    /// next wait returns immediately.
    pub(crate) fn wake(&self) {
        if let Err(e) = sys_write_u64(self.0, 1) {
            tracing::error!(error = %e, "unable to signal reactor wake-up");
        }
    }
}

/// Linux `epoll` poller.
///
/// Owns an `epoll` instance and the wake-up `eventfd` registered into it.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Wake-up eventfd.
    waker: Waker,
}

impl EpollPoller {
    /// Creates the epoll instance and registers the wake-up eventfd.
    ///
    /// Failing to create either descriptor leaves nothing allocated.
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let eventfd = match sys_eventfd() {
            Ok(fd) => fd,
            Err(e) => {
                sys_close(epoll);
                return Err(e);
            }
        };

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        let rc = unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, eventfd, &mut event) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            sys_close(eventfd);
            sys_close(epoll);
            return Err(err);
        }

        Ok(Self {
            epoll,
            waker: Waker(eventfd),
        })
    }

    /// Returns the wake-up handle.
    pub(crate) fn waker(&self) -> &Waker {
        &self.waker
    }

    /// Registers `fd` under `token`.
    pub(crate) fn register(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        let mut flags = 0;

        if interest.read {
            flags |= EPOLLIN | EPOLLRDHUP;
        }
        if interest.write {
            flags |= EPOLLOUT;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: token,
        };

        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_ADD, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Removes `fd` from the interest set.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Blocks until at least one descriptor is ready.
    ///
    /// `events` is cleared and refilled. The wake-up eventfd is drained and
    /// reported as an event carrying [`WAKE_TOKEN`]. `EINTR` is retried.
    pub(crate) fn poll(&self, events: &mut Vec<Event>) -> io::Result<()> {
        let mut raw: [epoll_event; MAX_EVENTS] = unsafe { mem::zeroed() };

        let n = loop {
            let n = unsafe { epoll_wait(self.epoll, raw.as_mut_ptr(), MAX_EVENTS as i32, -1) };
            if n >= 0 {
                break n as usize;
            }

            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        };

        events.clear();

        for ev in &raw[..n] {
            let token = ev.u64;
            let bits = ev.events;

            if token == WAKE_TOKEN {
                let _ = sys_read_u64(self.waker.0);
                events.push(Event {
                    token,
                    readable: true,
                    writable: false,
                });
                continue;
            }

            let readable = bits & ((EPOLLIN | EPOLLHUP | EPOLLRDHUP | EPOLLERR) as u32) != 0;
            let writable = bits & (EPOLLOUT as u32) != 0;

            if let Some(e) = events.iter_mut().find(|e| e.token == token) {
                e.readable |= readable;
                e.writable |= writable;
            } else {
                events.push(Event {
                    token,
                    readable,
                    writable,
                });
            }
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        sys_close(self.waker.0);
        sys_close(self.epoll);
    }
}
