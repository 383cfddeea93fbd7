//! Snapshot sources: where a list's bulk contents come from.
//!
//! A source pushes whole sequences into a sink. It may do so synchronously
//! inside `subscribe` and then finish ([`Values`]), or keep pushing for as
//! long as the subscription lives ([`SnapshotChannel`], or another list's
//! [`Feed`](crate::Feed)).

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::emitter::EventEmitter;
use crate::error::{Error, Result};
use crate::subscription::Subscription;

/// Receives each full sequence a source produces.
pub type SnapshotSink<T> = Arc<dyn Fn(&[Arc<T>]) + Send + Sync>;

/// Anything that can feed whole sequences into a list.
pub trait SnapshotSource<T>: Send + Sync {
    /// Start delivering sequences to `sink`.
    ///
    /// Values available right away may be delivered before this returns.
    fn subscribe(&self, sink: SnapshotSink<T>) -> Subscription;
}

impl<T, S: SnapshotSource<T> + ?Sized> SnapshotSource<T> for Arc<S> {
    fn subscribe(&self, sink: SnapshotSink<T>) -> Subscription {
        (**self).subscribe(sink)
    }
}

/// A cold source replaying a fixed series of sequences on every subscribe.
///
/// Delivery is synchronous and the source completes afterwards, so the
/// returned subscription is already closed.
#[derive(Debug)]
pub struct Values<T> {
    batches: Vec<Vec<Arc<T>>>,
}

impl<T> Values<T> {
    /// A source delivering each batch in order.
    pub fn new(batches: impl IntoIterator<Item = Vec<Arc<T>>>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
        }
    }

    /// A source delivering exactly one sequence.
    pub fn once(items: Vec<Arc<T>>) -> Self {
        Self {
            batches: vec![items],
        }
    }

    /// A source that completes without delivering anything.
    pub fn empty() -> Self {
        Self {
            batches: Vec::new(),
        }
    }

    /// Number of sequences delivered per subscribe.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Check if the source delivers nothing.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl<T: DeserializeOwned> Values<T> {
    /// A single-shot source built from a JSON array of entities.
    pub fn from_json(json: &str) -> Result<Self> {
        let items: Vec<T> =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;
        Ok(Self::once(items.into_iter().map(Arc::new).collect()))
    }
}

impl<T> Clone for Values<T> {
    fn clone(&self) -> Self {
        Self {
            batches: self.batches.clone(),
        }
    }
}

impl<T: Send + Sync> SnapshotSource<T> for Values<T> {
    fn subscribe(&self, sink: SnapshotSink<T>) -> Subscription {
        for batch in &self.batches {
            sink(batch.as_slice());
        }
        Subscription::closed()
    }
}

/// A hot source: every [`send`](SnapshotChannel::send) reaches the sinks
/// subscribed at that moment. Nothing is buffered for late subscribers.
pub struct SnapshotChannel<T> {
    sinks: Arc<EventEmitter<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> SnapshotChannel<T> {
    /// Create a channel with no subscribers.
    pub fn new() -> Self {
        Self {
            sinks: Arc::new(EventEmitter::new()),
        }
    }

    /// Push a full sequence to every current subscriber.
    pub fn send(&self, items: Vec<Arc<T>>) {
        self.sinks.emit(&items);
    }

    /// Number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sinks.size()
    }
}

impl<T: Send + Sync + 'static> Default for SnapshotChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SnapshotChannel<T> {
    fn clone(&self) -> Self {
        Self {
            sinks: Arc::clone(&self.sinks),
        }
    }
}

impl<T: Send + Sync + 'static> SnapshotSource<T> for SnapshotChannel<T> {
    fn subscribe(&self, sink: SnapshotSink<T>) -> Subscription {
        let id = self.sinks.on(move |items: &Vec<Arc<T>>| sink(items.as_slice()));
        let sinks = Arc::clone(&self.sinks);
        Subscription::new(move || sinks.off(id))
    }
}
