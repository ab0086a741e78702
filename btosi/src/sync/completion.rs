use parking_lot::{Condvar, Mutex};

/// Single-shot rendezvous between a producer and a waiter.
///
/// One side calls [`ready`](Self::ready) exactly once; the other blocks in
/// [`wait`](Self::wait) until the value arrives.
pub struct Completion<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

struct State<T> {
    value: Option<T>,
    fired: bool,
}

impl<T> Completion<T> {
    /// Creates a completion that has not fired yet.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                value: None,
                fired: false,
            }),
            cond: Condvar::new(),
        }
    }

    /// Delivers `value` and wakes the waiter.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    pub fn ready(&self, value: T) {
        let mut state = self.state.lock();
        assert!(!state.fired, "completion is already ready");

        state.fired = true;
        state.value = Some(value);
        self.cond.notify_all();
    }

    /// Blocks until the value is delivered and takes it.
    ///
    /// Returns `None` if another waiter already took the value.
    pub fn wait(&self) -> Option<T> {
        let mut state = self.state.lock();
        while !state.fired {
            self.cond.wait(&mut state);
        }

        state.value.take()
    }

    /// Whether [`ready`](Self::ready) has been called.
    pub fn is_ready(&self) -> bool {
        self.state.lock().fired
    }
}

impl<T> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}
