use super::handler::HandlerTable;
use crate::error::Result;
use crate::thread::WorkerThread;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Work queue capacity of a state machine thread.
const MACHINE_QUEUE_CAPACITY: usize = 256;

/// Message delivered to a state handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmMessage {
    /// The state was just entered.
    Enter,
    /// The state is being left.
    Exit,
    /// A message sent with [`StateMachine::send`].
    Process(u32, Vec<u8>),
}

/// What a state handler sees while handling one message.
pub struct StateContext<S> {
    message: SmMessage,
    state: S,
    next: Option<S>,
    defer: bool,
}

impl<S: Copy> StateContext<S> {
    /// The message being handled.
    pub fn message(&self) -> &SmMessage {
        &self.message
    }

    /// The state handling the message.
    pub fn state(&self) -> S {
        self.state
    }

    /// Requests a transition to `next` once the handler returns.
    ///
    /// Ignored while handling [`SmMessage::Exit`].
    pub fn transition_to(&mut self, next: S) {
        self.next = Some(next);
    }

    /// Keeps the current message for replay after the next transition.
    pub fn defer(&mut self) {
        self.defer = true;
    }
}

struct Core<S> {
    handlers: HandlerTable<S, StateContext<S>>,
    current: Option<S>,
    deferred: VecDeque<SmMessage>,
}

/// Hierarchy-free state machine running on its own worker thread.
///
/// Every state is a closure registered with [`add_state`](Self::add_state).
/// Messages, transitions and start-up are queued to the machine's thread
/// and handled there one at a time, so handlers never run concurrently.
pub struct StateMachine<S> {
    core: Arc<Mutex<Core<S>>>,
    thread: WorkerThread,
}

impl<S> StateMachine<S>
where
    S: Copy + Eq + Hash + Debug + Send + 'static,
{
    /// Creates a machine that has not entered any state yet, with its own
    /// thread named `name`.
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            core: Arc::new(Mutex::new(Core {
                handlers: HandlerTable::new(),
                current: None,
                deferred: VecDeque::new(),
            })),
            thread: WorkerThread::new(name, MACHINE_QUEUE_CAPACITY)?,
        })
    }

    /// Registers `handler` for `state`, replacing any previous one.
    pub fn add_state<F>(&self, state: S, handler: F)
    where
        F: FnMut(&mut StateContext<S>) + Send + 'static,
    {
        self.core.lock().handlers.register(state, handler);
    }

    /// Removes the handler of `state`.
    pub fn remove_state(&self, state: S) {
        self.core.lock().handlers.deregister(&state);
    }

    /// Enters `initial`.
    pub fn start(&self, initial: S) -> Result<()> {
        let core = Arc::clone(&self.core);
        self.thread.post(move || core.lock().transition(initial))
    }

    /// Leaves the current state and enters `next`.
    pub fn transition_to(&self, next: S) -> Result<()> {
        let core = Arc::clone(&self.core);
        self.thread.post(move || core.lock().transition(next))
    }

    /// Current state, `None` before the machine started.
    ///
    /// Must not be called from a state handler; use
    /// [`StateContext::state`] there.
    pub fn state(&self) -> Option<S> {
        self.core.lock().current
    }

    /// Delivers a message to the current state.
    pub fn send(&self, id: u32, payload: Vec<u8>) -> Result<()> {
        let core = Arc::clone(&self.core);
        self.thread
            .post(move || core.lock().handle(SmMessage::Process(id, payload)))
    }

    /// Holds a message until the next transition, then delivers it.
    ///
    /// Handlers defer the message they are handling with
    /// [`StateContext::defer`] instead.
    pub fn defer(&self, id: u32, payload: Vec<u8>) {
        self.core
            .lock()
            .deferred
            .push_back(SmMessage::Process(id, payload));
    }

    /// Stops the thread once every queued message has been handled.
    pub fn stop(&self) -> Result<()> {
        self.thread.stop();
        self.thread.join()
    }
}

impl<S> Core<S>
where
    S: Copy + Eq + Hash + Debug,
{
    fn deliver(&mut self, state: S, message: SmMessage) -> StateContext<S> {
        let mut ctx = StateContext {
            message,
            state,
            next: None,
            defer: false,
        };

        if !self.handlers.invoke(&state, &mut ctx) {
            tracing::warn!(state = ?state, message = ?ctx.message, "no handler for state");
        }
        ctx
    }

    fn handle(&mut self, message: SmMessage) {
        let Some(state) = self.current else {
            tracing::warn!(message = ?message, "state machine not started, message dropped");
            return;
        };

        let ctx = self.deliver(state, message);

        if ctx.defer {
            self.deferred.push_back(ctx.message);
        }
        if let Some(next) = ctx.next {
            self.transition(next);
        }
    }

    fn transition(&mut self, mut next: S) {
        loop {
            if let Some(current) = self.current {
                self.deliver(current, SmMessage::Exit);
            }

            tracing::debug!(from = ?self.current, to = ?next, "state transition");
            self.current = Some(next);

            match self.deliver(next, SmMessage::Enter).next {
                Some(again) => next = again,
                None => break,
            }
        }

        let replay: Vec<SmMessage> = self.deferred.drain(..).collect();
        for message in replay {
            self.handle(message);
        }
    }
}
