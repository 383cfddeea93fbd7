//! Entity contract and view-correlation keys.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A record the list can hold.
///
/// Entities are logically immutable: an update hands the list a new value
/// that takes the old one's place. The identity field is optional; code that
/// needs a key for an entity without one falls back to its position.
pub trait Entity: Send + Sync + 'static {
    /// Type of the identity field.
    type Id: PartialEq + Clone + Debug + Send + Sync;

    /// The stable identity of this entity, if it has one.
    fn id(&self) -> Option<&Self::Id>;

    /// Whether two entities share an identity.
    ///
    /// Two entities without an identity compare equal here.
    fn same_identity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

/// Key a view uses to correlate a rendered row with an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackKey<Id> {
    /// The entity's own identity.
    Id(Id),
    /// Position in the published sequence.
    Index(usize),
}

/// Default track-by function: identity when present, position otherwise.
pub fn track_by_id<T: Entity>(index: usize, entity: &T) -> TrackKey<T::Id> {
    match entity.id() {
        Some(id) => TrackKey::Id(id.clone()),
        None => TrackKey::Index(index),
    }
}
