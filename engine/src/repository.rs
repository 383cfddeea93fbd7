//! Repository event contract.
//!
//! A repository announces what happened to its entities through four
//! independent channels. Entities travel as `Arc<T>` so that removals and
//! replacements can name the exact instance they refer to: lists match those
//! two by `Arc::ptr_eq`, never by value.

use std::sync::Arc;

use crate::emitter::EventEmitter;

/// Payload of a replace event: `previous` is swapped for `next`.
pub struct Replaced<T> {
    /// The instance being replaced, matched by reference.
    pub previous: Arc<T>,
    /// The instance taking its place.
    pub next: Arc<T>,
}

impl<T> Replaced<T> {
    /// Pair the exact instance to swap out with its successor.
    pub fn new(previous: Arc<T>, next: Arc<T>) -> Self {
        Self { previous, next }
    }
}

impl<T> Clone for Replaced<T> {
    fn clone(&self) -> Self {
        Self {
            previous: Arc::clone(&self.previous),
            next: Arc::clone(&self.next),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Replaced<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replaced")
            .field("previous", &self.previous)
            .field("next", &self.next)
            .finish()
    }
}

/// Source of entity mutation events.
///
/// Ordering is only guaranteed within a single channel.
pub trait Repository<T>: Send + Sync + 'static {
    fn on_inserted(&self) -> &EventEmitter<Arc<T>>;

    fn on_updated(&self) -> &EventEmitter<Arc<T>>;

    fn on_removed(&self) -> &EventEmitter<Arc<T>>;

    fn on_replaced(&self) -> &EventEmitter<Replaced<T>>;
}

/// In-process event hub implementing [`Repository`].
///
/// An application repository embeds one of these and calls the publish
/// methods after each write it performs.
pub struct EventRepository<T> {
    inserted: EventEmitter<Arc<T>>,
    updated: EventEmitter<Arc<T>>,
    removed: EventEmitter<Arc<T>>,
    replaced: EventEmitter<Replaced<T>>,
}

impl<T: Send + Sync + 'static> EventRepository<T> {
    /// Create a hub with no listeners.
    pub fn new() -> Self {
        Self {
            inserted: EventEmitter::new(),
            updated: EventEmitter::new(),
            removed: EventEmitter::new(),
            replaced: EventEmitter::new(),
        }
    }

    /// Create a hub behind an `Arc`, ready to hand to lists.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Announce a newly inserted entity.
    pub fn insert(&self, entity: Arc<T>) {
        self.inserted.emit(&entity);
    }

    /// Announce a new version of an entity.
    pub fn update(&self, entity: Arc<T>) {
        self.updated.emit(&entity);
    }

    /// Announce that this exact instance was removed.
    pub fn remove(&self, entity: Arc<T>) {
        self.removed.emit(&entity);
    }

    /// Announce that `previous` was replaced by `next`.
    pub fn replace(&self, previous: Arc<T>, next: Arc<T>) {
        self.replaced.emit(&Replaced::new(previous, next));
    }

    /// Total listeners across the four channels.
    pub fn listener_count(&self) -> usize {
        self.inserted.size() + self.updated.size() + self.removed.size() + self.replaced.size()
    }
}

impl<T: Send + Sync + 'static> Default for EventRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Repository<T> for EventRepository<T> {
    fn on_inserted(&self) -> &EventEmitter<Arc<T>> {
        &self.inserted
    }

    fn on_updated(&self) -> &EventEmitter<Arc<T>> {
        &self.updated
    }

    fn on_removed(&self) -> &EventEmitter<Arc<T>> {
        &self.removed
    }

    fn on_replaced(&self) -> &EventEmitter<Replaced<T>> {
        &self.replaced
    }
}

impl<T> std::fmt::Debug for EventRepository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRepository")
            .field("inserted", &self.inserted)
            .field("updated", &self.updated)
            .field("removed", &self.removed)
            .field("replaced", &self.replaced)
            .finish()
    }
}
