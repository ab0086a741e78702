//! Bounded blocking queue.
//!
//! [`BoundedChannel`] is the only queue in the runtime: worker threads use
//! it for their work items, the alarm service for pending alarms and the
//! state machine for its messages.

mod channel;

pub use channel::BoundedChannel;
