//! Closure-based state machine.
//!
//! States are plain identifiers mapped to closures through a
//! [`HandlerTable`]. The machine runs on a dedicated
//! [`WorkerThread`](crate::WorkerThread).

mod handler;
mod machine;

pub use handler::{Handler, HandlerTable};
pub use machine::{SmMessage, StateContext, StateMachine};
