use std::collections::HashMap;
use std::hash::Hash;

/// Boxed handler stored in a [`HandlerTable`].
pub type Handler<M> = Box<dyn FnMut(&mut M) + Send>;

/// Table of closures keyed by identifier.
///
/// Each key maps to at most one handler; registering a key again replaces
/// the previous handler.
pub struct HandlerTable<K, M> {
    handlers: HashMap<K, Handler<M>>,
}

impl<K, M> HandlerTable<K, M>
where
    K: Eq + Hash,
{
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Installs `handler` under `key`, returning `true` if it replaced one.
    pub fn register<F>(&mut self, key: K, handler: F) -> bool
    where
        F: FnMut(&mut M) + Send + 'static,
    {
        self.handlers.insert(key, Box::new(handler)).is_some()
    }

    /// Removes the handler under `key`, returning `true` if there was one.
    pub fn deregister(&mut self, key: &K) -> bool {
        self.handlers.remove(key).is_some()
    }

    /// Calls the handler under `key` with `message`.
    ///
    /// Returns `false` when no handler is registered for `key`.
    pub fn invoke(&mut self, key: &K, message: &mut M) -> bool {
        match self.handlers.get_mut(key) {
            Some(handler) => {
                handler(message);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<K, M> Default for HandlerTable<K, M>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
