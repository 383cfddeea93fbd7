//! The published, read-only view of a list.
//!
//! A snapshot is what observers of a [`Feed`](crate::Feed) receive. It shares
//! the entities with the list that produced it but can never be mutated
//! through, so a subscriber keeping an old snapshot around is always safe.

use crate::error::Result;
use serde::{Serialize, Serializer};
use std::ops::Deref;
use std::sync::Arc;

/// An immutable sequence of entities at one point in time.
///
/// Cloning is a reference-count bump. Equality compares entity values; use
/// [`Snapshot::ptr_eq`] to ask whether two snapshots are the same publication.
pub struct Snapshot<T> {
    items: Arc<[Arc<T>]>,
}

impl<T> Snapshot<T> {
    /// An empty snapshot.
    pub fn empty() -> Self {
        Self {
            items: Arc::from(Vec::new()),
        }
    }

    /// Freeze a sequence into a snapshot.
    pub fn from_vec(items: Vec<Arc<T>>) -> Self {
        Self {
            items: Arc::from(items),
        }
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the snapshot holds no entities.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entities as a slice.
    pub fn as_slice(&self) -> &[Arc<T>] {
        &self.items
    }

    /// Copy the entity handles out into a fresh, owned sequence.
    pub fn to_vec(&self) -> Vec<Arc<T>> {
        self.items.to_vec()
    }

    /// Whether both snapshots are the same publication.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    /// Position of `entity` compared by reference.
    pub fn position_of(&self, entity: &Arc<T>) -> Option<usize> {
        self.items.iter().position(|e| Arc::ptr_eq(e, entity))
    }
}

impl<T: Serialize> Snapshot<T> {
    /// Serialize the entities as a JSON array.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::Error::InvalidSnapshot(e.to_string()))
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = [Arc<T>];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<T> From<Vec<Arc<T>>> for Snapshot<T> {
    fn from(items: Vec<Arc<T>>) -> Self {
        Self::from_vec(items)
    }
}

impl<T: PartialEq> PartialEq for Snapshot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl<T: Serialize> Serialize for Snapshot<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter().map(|e| e.as_ref()))
    }
}
