//! Change-hook registry shared by lists and data sources.
//!
//! [`emit`](EventEmitter::emit) copies the hook table before calling out, so
//! the set of hooks that sees an event is fixed when emission starts. Hooks
//! registered from inside a hook first fire on the following event. Hooks
//! removed from inside a hook still finish the event in progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifies a registered hook; pass it back to [`EventEmitter::off`].
pub type ListenerId = u64;

/// Hook signature.
pub type ListenerFn<E> = dyn Fn(&E) + Send + Sync;

struct Hook<E> {
    id: ListenerId,
    call: Arc<ListenerFn<E>>,
}

/// Ordered table of hooks fired synchronously for each event.
pub struct EventEmitter<E> {
    hooks: Mutex<Vec<Hook<E>>>,
    last_id: AtomicU64,
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            last_id: AtomicU64::new(0),
        }
    }

    /// Append a hook. Ids are never reused within one emitter.
    pub fn on(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.hooks.lock().push(Hook {
            id,
            call: Arc::new(callback),
        });
        id
    }

    /// Drop the hook with `id`, if it is still registered.
    pub fn off(&self, id: ListenerId) {
        self.hooks.lock().retain(|hook| hook.id != id);
    }

    /// Fire `event` at each hook in the order they were added.
    ///
    /// A panicking hook unwinds into the caller and the remaining hooks are
    /// skipped for this event.
    pub fn emit(&self, event: &E) {
        let round: Vec<Arc<ListenerFn<E>>> =
            self.hooks.lock().iter().map(|hook| Arc::clone(&hook.call)).collect();
        for call in round {
            call(event);
        }
    }

    pub fn size(&self) -> usize {
        self.hooks.lock().len()
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.size())
            .finish()
    }
}
