//! # Livelist View
//!
//! Lifecycle adapter between a list-rendering view and
//! [`livelist_engine`]. A [`DataSource`] is created once per view with a
//! repository, an initial snapshot source and [`DataSourceOptions`]; the
//! view then drives it with `connect` and `disconnect`.
//!
//! ```rust
//! use std::sync::Arc;
//! use livelist_engine::{Entity, EventRepository, TrackKey, Values};
//! use livelist_view::{DataSource, DataSourceOptions};
//!
//! #[derive(Debug)]
//! struct Contact {
//!     id: u32,
//!     name: &'static str,
//! }
//!
//! impl Entity for Contact {
//!     type Id = u32;
//!
//!     fn id(&self) -> Option<&u32> {
//!         Some(&self.id)
//!     }
//! }
//!
//! let repository = EventRepository::new_shared();
//! let initial = vec![Arc::new(Contact { id: 1, name: "Ada" })];
//! let source = DataSource::new(
//!     Arc::clone(&repository),
//!     Values::once(initial),
//!     DataSourceOptions::new(),
//! );
//!
//! let feed = source.connect();
//! repository.insert(Arc::new(Contact { id: 2, name: "Grace" }));
//!
//! let rows = feed.latest();
//! assert_eq!(rows.len(), 2);
//! assert_eq!(source.track_keys(&rows), vec![TrackKey::Id(1), TrackKey::Id(2)]);
//!
//! source.disconnect();
//! ```

pub mod data_source;

pub use data_source::{DataSource, DataSourceOptions, TrackByFn};
