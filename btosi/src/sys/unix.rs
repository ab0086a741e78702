//! Thin wrappers around the Linux system calls used by the runtime.
//!
//! Every wrapper returns `io::Result` built from `errno`; callers decide
//! whether a failure is fatal.

use libc::{
    CLOCK_BOOTTIME, EFD_CLOEXEC, EFD_NONBLOCK, EFD_SEMAPHORE, POLLIN, PRIO_PROCESS, SCHED_FIFO,
    TFD_CLOEXEC, TFD_NONBLOCK, TFD_TIMER_ABSTIME, c_int, c_void, clockid_t, itimerspec, pollfd,
    sched_param, timespec,
};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Largest value an eventfd counter can hold.
const EVENTFD_MAX: u64 = u64::MAX - 1;

/// Creates a non-blocking semaphore-mode `eventfd` holding `value`.
///
/// `eventfd(2)` only accepts a 32-bit initial value, so larger counts are
/// written after creation.
pub(crate) fn sys_eventfd_semaphore(value: u64) -> io::Result<RawFd> {
    let fd = unsafe { libc::eventfd(0, EFD_SEMAPHORE | EFD_NONBLOCK | EFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }

    if value > 0 {
        if let Err(e) = sys_write_u64(fd, value.min(EVENTFD_MAX)) {
            sys_close(fd);
            return Err(e);
        }
    }

    Ok(fd)
}

/// Creates a non-blocking counter-mode `eventfd` used as a wake-up signal.
pub(crate) fn sys_eventfd() -> io::Result<RawFd> {
    let fd = unsafe { libc::eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// Reads one 8-byte counter value (eventfd, timerfd).
pub(crate) fn sys_read_u64(fd: RawFd) -> io::Result<u64> {
    let mut value = 0u64;
    let n = unsafe { libc::read(fd, &mut value as *mut u64 as *mut c_void, 8) };
    if n == 8 {
        Ok(value)
    } else if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short counter read"))
    }
}

/// Adds `value` to an eventfd counter.
pub(crate) fn sys_write_u64(fd: RawFd, value: u64) -> io::Result<()> {
    let n = unsafe { libc::write(fd, &value as *const u64 as *const c_void, 8) };
    if n == 8 {
        Ok(())
    } else if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Err(io::Error::new(io::ErrorKind::WriteZero, "short counter write"))
    }
}

/// Closes a file descriptor.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

/// Blocks until `fd` is readable or `timeout` elapses.
///
/// Returns `true` when the descriptor became readable. `EINTR` is retried.
pub(crate) fn sys_poll_readable(fd: RawFd, timeout: Option<Duration>) -> io::Result<bool> {
    let timeout_ms: c_int = timeout
        .map(|t| t.as_millis().min(c_int::MAX as u128) as c_int)
        .unwrap_or(-1);

    loop {
        let mut pfd = pollfd {
            fd,
            events: POLLIN,
            revents: 0,
        };

        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }

        return Ok(rc > 0);
    }
}

/// Returns the kernel thread id of the calling thread.
pub(crate) fn sys_gettid() -> i32 {
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

/// Reads `clock` and returns it as a duration since the clock's epoch.
pub(crate) fn sys_clock_now(clock: clockid_t) -> io::Result<Duration> {
    let mut ts = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
}

/// Monotonic time including suspend, the time base of every alarm deadline.
pub(crate) fn boot_time() -> Duration {
    match sys_clock_now(CLOCK_BOOTTIME) {
        Ok(now) => now,
        Err(e) => {
            tracing::error!(error = %e, "unable to get current time");
            Duration::ZERO
        }
    }
}

/// Creates a non-blocking `timerfd` on `clock`.
pub(crate) fn sys_timerfd_create(clock: clockid_t) -> io::Result<RawFd> {
    let fd = unsafe { libc::timerfd_create(clock, TFD_NONBLOCK | TFD_CLOEXEC) };
    if fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(fd)
    }
}

/// Arms `fd` to fire once at the absolute `deadline`, or disarms it on `None`.
pub(crate) fn sys_timerfd_set(fd: RawFd, deadline: Option<Duration>) -> io::Result<()> {
    let value = match deadline {
        // An all-zero it_value disarms the timer; keep armed deadlines non-zero.
        Some(d) => to_timespec(d.max(Duration::from_nanos(1))),
        None => to_timespec(Duration::ZERO),
    };

    let setting = itimerspec {
        it_interval: to_timespec(Duration::ZERO),
        it_value: value,
    };

    let rc = unsafe { libc::timerfd_settime(fd, TFD_TIMER_ABSTIME, &setting, std::ptr::null_mut()) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Sets the nice value of thread `tid`.
pub(crate) fn sys_setpriority(tid: i32, priority: i32) -> io::Result<()> {
    let rc = unsafe { libc::setpriority(PRIO_PROCESS, tid as libc::id_t, priority) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Moves thread `tid` to `SCHED_FIFO` with the given priority.
pub(crate) fn sys_set_fifo(tid: i32, priority: i32) -> io::Result<()> {
    let param = sched_param {
        sched_priority: priority,
    };

    let rc = unsafe { libc::sched_setscheduler(tid, SCHED_FIFO, &param) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn to_timespec(d: Duration) -> timespec {
    timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}
