//! View data source tying a [`ListSynchronizer`] to a view's attach/detach
//! lifecycle.
//!
//! A view calls [`connect`](DataSource::connect) when it appears and
//! [`disconnect`](DataSource::disconnect) when it goes away. Each connect
//! builds a fresh synchronizer, so there is never more than one live list
//! per data source. Change hooks registered on the data source outlive
//! individual connections.

use std::fmt::Display;
use std::sync::Arc;

use livelist_engine::{
    track_by_id, Entity, Error, EventEmitter, Feed, IncludeFn, ListChange, ListSynchronizer,
    ListenerId, Replaced, Repository, Result, SnapshotSource, TrackKey,
};
use parking_lot::Mutex;
use tracing::debug;

/// Computes the key a view uses to correlate a rendered row with an entity.
pub type TrackByFn<T> = Arc<dyn Fn(usize, &T) -> TrackKey<<T as Entity>::Id> + Send + Sync>;

/// Options for a [`DataSource`].
///
/// ```rust
/// # use livelist_engine::{Entity, TrackKey};
/// # use livelist_view::DataSourceOptions;
/// # struct Note { id: u32, archived: bool }
/// # impl Entity for Note {
/// #     type Id = u32;
/// #     fn id(&self) -> Option<&u32> { Some(&self.id) }
/// # }
/// let options = DataSourceOptions::<Note>::new()
///     .include(|note| !note.archived)
///     .track_by(|index, _| TrackKey::Index(index));
/// ```
pub struct DataSourceOptions<T: Entity> {
    include: Option<IncludeFn<T>>,
    track_by: Option<TrackByFn<T>>,
}

impl<T: Entity> DataSourceOptions<T> {
    /// Accept every insert and track rows by entity id.
    pub fn new() -> Self {
        Self {
            include: None,
            track_by: None,
        }
    }

    /// Only append inserted entities for which `predicate` returns true.
    pub fn include(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.include = Some(Arc::new(predicate));
        self
    }

    /// Use `track_by` instead of [`track_by_id`].
    pub fn track_by(
        mut self,
        track_by: impl Fn(usize, &T) -> TrackKey<T::Id> + Send + Sync + 'static,
    ) -> Self {
        self.track_by = Some(Arc::new(track_by));
        self
    }
}

impl<T: Entity> Default for DataSourceOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Clone for DataSourceOptions<T> {
    fn clone(&self) -> Self {
        Self {
            include: self.include.clone(),
            track_by: self.track_by.clone(),
        }
    }
}

impl<T: Entity> std::fmt::Debug for DataSourceOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceOptions")
            .field("include", &self.include.is_some())
            .field("track_by", &self.track_by.is_some())
            .finish()
    }
}

/// View adapter over a repository and an initial snapshot source.
///
/// `reload` and `modify` quietly do nothing while disconnected; the `try_`
/// variants and [`feed`](DataSource::feed) report [`Error::NotConnected`]
/// instead.
pub struct DataSource<T: Entity, R: Repository<T>> {
    repository: Arc<R>,
    source: Arc<dyn SnapshotSource<T>>,
    options: DataSourceOptions<T>,
    list: Mutex<Option<Arc<ListSynchronizer<T, R>>>>,
    hooks: Arc<EventEmitter<ListChange<T>>>,
}

impl<T: Entity, R: Repository<T>> DataSource<T, R> {
    /// Build a data source that starts disconnected.
    ///
    /// `source` is subscribed afresh on every [`connect`](Self::connect);
    /// nothing touches `repository` until then.
    pub fn new(
        repository: Arc<R>,
        source: impl SnapshotSource<T> + 'static,
        options: DataSourceOptions<T>,
    ) -> Self {
        Self {
            repository,
            source: Arc::new(source),
            options,
            list: Mutex::new(None),
            hooks: Arc::new(EventEmitter::new()),
        }
    }

    /// The repository lists are bound to.
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Start a fresh list on the configured source and return its feed.
    ///
    /// A list left over from an earlier connect is torn down first.
    pub fn connect(&self) -> Feed<T> {
        self.disconnect();

        let list = Arc::new(ListSynchronizer::new(Arc::clone(&self.repository)));
        let hooks = Arc::clone(&self.hooks);
        list.on_change(move |change| hooks.emit(change));

        *self.list.lock() = Some(Arc::clone(&list));
        let feed = list.init(&*self.source, self.options.include.clone());
        debug!(len = list.len(), "data source connected");
        feed
    }

    /// Tear down the live list, if any. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let list = self.list.lock().take();
        if let Some(list) = list {
            list.disconnect();
            debug!("data source disconnected");
        }
    }

    /// Whether a list is currently live.
    pub fn is_connected(&self) -> bool {
        self.list.lock().is_some()
    }

    /// Feed of the live list.
    pub fn feed(&self) -> Result<Feed<T>> {
        self.live()?.feed()
    }

    /// Replace the live list's contents from `source`. No-op when
    /// disconnected.
    pub fn reload<S>(&self, source: &S)
    where
        S: SnapshotSource<T> + ?Sized,
    {
        if let Ok(list) = self.live() {
            list.reload(source);
        }
    }

    /// [`reload`](Self::reload), failing when disconnected.
    pub fn try_reload<S>(&self, source: &S) -> Result<()>
    where
        S: SnapshotSource<T> + ?Sized,
    {
        self.live()?.reload(source);
        Ok(())
    }

    /// Rewrite the live list through `transform`. No-op when disconnected.
    pub fn modify<F, I>(&self, transform: F)
    where
        F: FnOnce(std::vec::IntoIter<Arc<T>>) -> I,
        I: IntoIterator<Item = Arc<T>>,
    {
        if let Ok(list) = self.live() {
            list.modify(transform);
        }
    }

    /// Fallible rewrite of the live list.
    ///
    /// Fails with [`Error::NotConnected`] when disconnected and with
    /// [`Error::Transform`] when `transform` yields an error.
    pub fn try_modify<F, I, E>(&self, transform: F) -> Result<()>
    where
        F: FnOnce(std::vec::IntoIter<Arc<T>>) -> I,
        I: IntoIterator<Item = std::result::Result<Arc<T>, E>>,
        E: Display,
    {
        self.live()?.try_modify(transform)
    }

    /// View-correlation key for `entity` at `index`.
    pub fn track_by(&self, index: usize, entity: &T) -> TrackKey<T::Id> {
        match &self.options.track_by {
            Some(track_by) => track_by(index, entity),
            None => track_by_id(index, entity),
        }
    }

    /// Keys for every row of a published sequence.
    pub fn track_keys(&self, items: &[Arc<T>]) -> Vec<TrackKey<T::Id>> {
        items
            .iter()
            .enumerate()
            .map(|(index, entity)| self.track_by(index, entity))
            .collect()
    }

    /// Called for every change any connected list applies.
    pub fn on_change(
        &self,
        callback: impl Fn(&ListChange<T>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.hooks.on(callback)
    }

    /// Called with each entity appended to the list.
    pub fn on_inserted(&self, callback: impl Fn(&Arc<T>) + Send + Sync + 'static) -> ListenerId {
        self.hooks.on(move |change| {
            if let ListChange::Inserted { entity, .. } = change {
                callback(entity);
            }
        })
    }

    /// Called with the new version of each updated entity.
    pub fn on_updated(&self, callback: impl Fn(&Arc<T>) + Send + Sync + 'static) -> ListenerId {
        self.hooks.on(move |change| {
            if let ListChange::Updated { entity, .. } = change {
                callback(entity);
            }
        })
    }

    /// Called with each entity removed from the list.
    pub fn on_removed(&self, callback: impl Fn(&Arc<T>) + Send + Sync + 'static) -> ListenerId {
        self.hooks.on(move |change| {
            if let ListChange::Removed { entity, .. } = change {
                callback(entity);
            }
        })
    }

    /// Called with each replacement applied to the list.
    pub fn on_replaced(
        &self,
        callback: impl Fn(&Replaced<T>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.hooks.on(move |change| {
            if let ListChange::Replaced { previous, next, .. } = change {
                callback(&Replaced::new(Arc::clone(previous), Arc::clone(next)));
            }
        })
    }

    /// Remove a hook registered with any of the `on_*` methods.
    pub fn off(&self, id: ListenerId) {
        self.hooks.off(id);
    }

    fn live(&self) -> Result<Arc<ListSynchronizer<T, R>>> {
        self.list.lock().clone().ok_or(Error::NotConnected)
    }
}

impl<T: Entity, R: Repository<T>> Drop for DataSource<T, R> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: Entity, R: Repository<T>> std::fmt::Debug for DataSource<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("connected", &self.is_connected())
            .field("options", &self.options)
            .field("hooks", &self.hooks.size())
            .finish()
    }
}
