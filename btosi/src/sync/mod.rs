//! Synchronization primitives shared by the queue, worker and alarm layers.

mod completion;
mod semaphore;

pub use completion::Completion;
pub use semaphore::Semaphore;
