//! # Livelist Engine
//!
//! Keeps an in-memory ordered list synchronized with full-list snapshots and
//! with fine-grained mutation events from an entity repository, and
//! republishes the whole list after every change.
//!
//! A view typically loads its rows once as a bulk snapshot and from then on
//! only needs to hear about what changed. The engine merges the two: a
//! snapshot replaces the list wholesale, repository events patch it in
//! place, and observers see one always-current [`Snapshot`] feed.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine knows nothing about where snapshots or events
//!   come from
//! - **Synchronous**: every change is applied and published inside the
//!   callback that delivered it
//! - **Ordered**: events apply in delivery order and observers see every
//!   publication in that same order
//! - **Leak-free teardown**: after `disconnect` no callback reaches the list
//!
//! ## Core Concepts
//!
//! ### Entities
//!
//! Anything implementing [`Entity`]: a value with an optional identity.
//! Entities move around as `Arc<T>`, so "the same instance" is
//! `Arc::ptr_eq`, and entities are never mutated in place.
//!
//! ### Repository events
//!
//! A [`Repository`] exposes four channels: inserted, updated, removed and
//! replaced. [`EventRepository`] is a ready-made hub to embed.
//!
//! - Insert appends, if the inclusion predicate accepts the entity
//! - Update swaps the first element with the same identity
//! - Remove deletes the first element that is the same instance
//! - Replace overwrites the first element that is the same instance as
//!   `previous`
//!
//! Events that match nothing are dropped silently.
//!
//! ### Snapshot sources and the feed
//!
//! A [`SnapshotSource`] pushes whole sequences: [`Values`] replays a fixed
//! series, [`SnapshotChannel`] forwards whatever is sent to it, and a
//! [`Feed`] is itself a source. The [`Feed`] returned by
//! [`ListSynchronizer::init`] replays its latest value to new subscribers.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use livelist_engine::{Entity, EventRepository, ListSynchronizer, Values};
//!
//! #[derive(Debug)]
//! struct Task {
//!     id: u32,
//!     title: String,
//! }
//!
//! impl Entity for Task {
//!     type Id = u32;
//!
//!     fn id(&self) -> Option<&u32> {
//!         Some(&self.id)
//!     }
//! }
//!
//! let repository = EventRepository::new_shared();
//! let list = ListSynchronizer::new(Arc::clone(&repository));
//!
//! // 1. Bulk load
//! let initial = vec![Arc::new(Task { id: 1, title: "write".into() })];
//! let feed = list.init(&Values::once(initial), None);
//!
//! // 2. Incremental change
//! repository.insert(Arc::new(Task { id: 2, title: "review".into() }));
//!
//! // 3. Observe
//! let titles: Vec<_> = feed.latest().iter().map(|t| t.title.clone()).collect();
//! assert_eq!(titles, vec!["write", "review"]);
//!
//! list.disconnect();
//! ```

pub mod change;
pub mod emitter;
pub mod entity;
pub mod error;
pub mod feed;
pub mod list;
pub mod repository;
pub mod snapshot;
pub mod source;
pub mod subscription;

// Re-export main types at crate root
pub use change::{ChangeKind, ListChange};
pub use emitter::{EventEmitter, ListenerId};
pub use entity::{track_by_id, Entity, TrackKey};
pub use error::{Error, Result};
pub use feed::Feed;
pub use list::{include_all, IncludeFn, ListSynchronizer};
pub use repository::{EventRepository, Replaced, Repository};
pub use snapshot::Snapshot;
pub use source::{SnapshotChannel, SnapshotSink, SnapshotSource, Values};
pub use subscription::Subscription;
