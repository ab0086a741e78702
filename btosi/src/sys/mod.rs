//! Platform layer.
//!
//! This module wraps the Linux primitives the runtime is built on:
//! - `epoll` for readiness multiplexing,
//! - `eventfd` for wake-ups and pollable semaphores,
//! - `timerfd` on boot-time clocks for alarms,
//! - thread id and scheduling calls for worker threads.

pub(crate) mod epoll;
pub(crate) mod unix;

pub(crate) use epoll::EpollPoller as Poller;
