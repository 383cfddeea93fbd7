//! Per-event change notifications for a list.
//!
//! Emitted by [`ListSynchronizer`](crate::ListSynchronizer) after the new
//! snapshot has been published, for consumers that want discrete
//! notifications next to the full feed.

use std::sync::Arc;

/// One accepted mutation and where it landed.
pub enum ListChange<T> {
    /// `entity` was appended at `index`.
    Inserted { index: usize, entity: Arc<T> },
    /// The element at `index` with the same identity was swapped for `entity`.
    Updated {
        index: usize,
        previous: Arc<T>,
        entity: Arc<T>,
    },
    /// `entity` was removed from `index`; later elements shifted left.
    Removed { index: usize, entity: Arc<T> },
    /// `previous` at `index` was overwritten by `next`.
    Replaced {
        index: usize,
        previous: Arc<T>,
        next: Arc<T>,
    },
}

/// Discriminant of a [`ListChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Removed,
    Replaced,
}

impl<T> ListChange<T> {
    /// Which kind of change this is.
    pub fn kind(&self) -> ChangeKind {
        match self {
            Self::Inserted { .. } => ChangeKind::Inserted,
            Self::Updated { .. } => ChangeKind::Updated,
            Self::Removed { .. } => ChangeKind::Removed,
            Self::Replaced { .. } => ChangeKind::Replaced,
        }
    }

    /// Position in the sequence the change applied to.
    pub fn index(&self) -> usize {
        match self {
            Self::Inserted { index, .. } => *index,
            Self::Updated { index, .. } => *index,
            Self::Removed { index, .. } => *index,
            Self::Replaced { index, .. } => *index,
        }
    }

    /// The entity now in the list, if the change left one behind.
    pub fn current(&self) -> Option<&Arc<T>> {
        match self {
            Self::Inserted { entity, .. } => Some(entity),
            Self::Updated { entity, .. } => Some(entity),
            Self::Removed { .. } => None,
            Self::Replaced { next, .. } => Some(next),
        }
    }
}

impl<T> Clone for ListChange<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Inserted { index, entity } => Self::Inserted {
                index: *index,
                entity: Arc::clone(entity),
            },
            Self::Updated {
                index,
                previous,
                entity,
            } => Self::Updated {
                index: *index,
                previous: Arc::clone(previous),
                entity: Arc::clone(entity),
            },
            Self::Removed { index, entity } => Self::Removed {
                index: *index,
                entity: Arc::clone(entity),
            },
            Self::Replaced {
                index,
                previous,
                next,
            } => Self::Replaced {
                index: *index,
                previous: Arc::clone(previous),
                next: Arc::clone(next),
            },
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ListChange<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inserted { index, entity } => f
                .debug_struct("Inserted")
                .field("index", index)
                .field("entity", entity)
                .finish(),
            Self::Updated {
                index,
                previous,
                entity,
            } => f
                .debug_struct("Updated")
                .field("index", index)
                .field("previous", previous)
                .field("entity", entity)
                .finish(),
            Self::Removed { index, entity } => f
                .debug_struct("Removed")
                .field("index", index)
                .field("entity", entity)
                .finish(),
            Self::Replaced {
                index,
                previous,
                next,
            } => f
                .debug_struct("Replaced")
                .field("index", index)
                .field("previous", previous)
                .field("next", next)
                .finish(),
        }
    }
}
