//! List synchronization: one ordered list kept in step with a snapshot
//! source and a repository's mutation events.
//!
//! # Lifecycle
//!
//! A synchronizer starts uninitialized. [`init`](ListSynchronizer::init)
//! binds it to a snapshot source and the repository's four channels and
//! returns the [`Feed`] the list publishes on; [`disconnect`] drops the
//! binding again. Calling `init` while bound disconnects first.
//!
//! Every binding gets a fresh epoch. Repository and snapshot callbacks hold
//! only a `Weak` reference to the list plus the epoch they were created for,
//! and ignore anything once that epoch is gone. That covers emissions that
//! were already in flight when the binding was torn down.
//!
//! # Locking
//!
//! List state sits behind a `parking_lot::Mutex` that is never held while
//! caller code runs: not during feed delivery, change notifications, the
//! inclusion predicate, a `modify` transform or a source's `subscribe`.
//! Callbacks may therefore call back into the list, including `disconnect`.
//!
//! # Ordering
//!
//! While a `modify` transform runs, repository events and snapshot values
//! are held back and applied in arrival order once the rewritten list is
//! committed. Change notifications are queued under the state lock and
//! handed out in commit order, even when a listener triggers further changes.
//!
//! [`disconnect`]: ListSynchronizer::disconnect

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    change::ListChange,
    emitter::{EventEmitter, ListenerId},
    entity::Entity,
    error::{Error, Result},
    feed::Feed,
    repository::{Replaced, Repository},
    snapshot::Snapshot,
    source::{SnapshotSink, SnapshotSource},
    subscription::Subscription,
};

/// Decides whether a freshly inserted entity joins the list.
pub type IncludeFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// The default inclusion predicate: every inserted entity is accepted.
pub fn include_all<T>(_entity: &T) -> bool {
    true
}

/// Listener ids registered on the repository for one binding.
#[derive(Debug, Clone, Copy)]
struct RepositoryListeners {
    inserted: ListenerId,
    updated: ListenerId,
    removed: ListenerId,
    replaced: ListenerId,
}

/// A value delivered to the list from the repository or the snapshot source.
enum Incoming<T> {
    Inserted(Arc<T>),
    Updated(Arc<T>),
    Removed(Arc<T>),
    Replaced(Replaced<T>),
    Snapshot(Vec<Arc<T>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    /// Incoming values apply right away.
    Open,
    /// A `modify` transform is running; incoming values queue up.
    Held,
    /// Queued values are being applied; newer ones queue behind them.
    Draining,
}

struct Binding<T> {
    epoch: u64,
    items: Vec<Arc<T>>,
    feed: Feed<T>,
    include: IncludeFn<T>,
    listeners: RepositoryListeners,
    snapshot: Option<Subscription>,
    gate: Gate,
    held: VecDeque<Incoming<T>>,
}

struct ListState<T> {
    binding: Option<Binding<T>>,
    next_epoch: u64,
    /// Accepted changes in commit order, not yet handed to listeners.
    changes: VecDeque<ListChange<T>>,
    notifying: bool,
}

impl<T> ListState<T> {
    fn current(&mut self, epoch: u64) -> Option<&mut Binding<T>> {
        self.binding.as_mut().filter(|b| b.epoch == epoch)
    }
}

/// What applying an incoming value did to the sequence.
enum Outcome<T> {
    /// Replaced wholesale (snapshot or `modify`).
    Rewritten,
    Changed(ListChange<T>),
}

/// Apply one incoming value to `items`. `None` means nothing matched.
fn apply<T: Entity>(
    epoch: u64,
    items: &mut Vec<Arc<T>>,
    incoming: Incoming<T>,
) -> Option<Outcome<T>> {
    match incoming {
        Incoming::Inserted(entity) => {
            items.push(Arc::clone(&entity));
            Some(Outcome::Changed(ListChange::Inserted {
                index: items.len() - 1,
                entity,
            }))
        }
        Incoming::Updated(entity) => {
            let Some(index) = items.iter().position(|e| e.same_identity(&*entity)) else {
                trace!(epoch, id = ?entity.id(), "update dropped: no element with that id");
                return None;
            };
            let previous = std::mem::replace(&mut items[index], Arc::clone(&entity));
            Some(Outcome::Changed(ListChange::Updated {
                index,
                previous,
                entity,
            }))
        }
        Incoming::Removed(entity) => {
            let Some(index) = items.iter().position(|e| Arc::ptr_eq(e, &entity)) else {
                trace!(epoch, id = ?entity.id(), "remove dropped: instance not in list");
                return None;
            };
            let entity = items.remove(index);
            Some(Outcome::Changed(ListChange::Removed { index, entity }))
        }
        Incoming::Replaced(Replaced { previous, next }) => {
            let Some(index) = items.iter().position(|e| Arc::ptr_eq(e, &previous)) else {
                trace!(epoch, id = ?previous.id(), "replace dropped: instance not in list");
                return None;
            };
            let previous = std::mem::replace(&mut items[index], Arc::clone(&next));
            Some(Outcome::Changed(ListChange::Replaced {
                index,
                previous,
                next,
            }))
        }
        Incoming::Snapshot(next) => {
            trace!(epoch, len = next.len(), "snapshot replaced list");
            *items = next;
            Some(Outcome::Rewritten)
        }
    }
}

/// What a callback keeps of the list: weak references and its epoch.
struct Link<T> {
    state: Weak<Mutex<ListState<T>>>,
    changes: Weak<EventEmitter<ListChange<T>>>,
    epoch: u64,
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self {
            state: Weak::clone(&self.state),
            changes: Weak::clone(&self.changes),
            epoch: self.epoch,
        }
    }
}

impl<T: Entity> Link<T> {
    /// Entry point for repository events and snapshot values.
    fn receive(&self, incoming: Incoming<T>) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let include = {
            let mut guard = state.lock();
            let Some(binding) = guard.current(self.epoch) else {
                return;
            };
            if binding.gate != Gate::Open {
                trace!(epoch = self.epoch, held = binding.held.len() + 1, "held until modify finishes");
                binding.held.push_back(incoming);
                return;
            }
            Arc::clone(&binding.include)
        };
        self.process(incoming, &include, false);
    }

    /// Filter inserts through the predicate, then commit. Unless `draining`,
    /// a gate that closed meanwhile sends the value to the held queue.
    fn process(&self, incoming: Incoming<T>, include: &IncludeFn<T>, draining: bool) {
        if let Incoming::Inserted(entity) = &incoming {
            if !include(&**entity) {
                trace!(epoch = self.epoch, id = ?entity.id(), "insert rejected by predicate");
                return;
            }
        }
        self.commit(|binding| {
            if !draining && binding.gate != Gate::Open {
                binding.held.push_back(incoming);
                return None;
            }
            apply(self.epoch, &mut binding.items, incoming)
        });
    }

    /// Run `f` on the current binding. If it reports an outcome, stage the
    /// new snapshot and queue the change under the lock, then deliver both
    /// after releasing it. Returns whether anything was committed.
    fn commit(&self, f: impl FnOnce(&mut Binding<T>) -> Option<Outcome<T>>) -> bool {
        let Some(state) = self.state.upgrade() else {
            return false;
        };
        let feed = {
            let mut guard = state.lock();
            let ListState {
                binding, changes, ..
            } = &mut *guard;
            let Some(binding) = binding.as_mut().filter(|b| b.epoch == self.epoch) else {
                return false;
            };
            let Some(outcome) = f(binding) else {
                return false;
            };
            binding
                .feed
                .stage(Snapshot::from_vec(binding.items.clone()));
            if let Outcome::Changed(change) = outcome {
                trace!(epoch = self.epoch, kind = ?change.kind(), index = change.index(), "applied repository event");
                changes.push_back(change);
            }
            binding.feed.clone()
        };
        feed.flush();
        self.notify(&state);
        true
    }

    /// Hand queued changes to change listeners in commit order. A nested
    /// commit leaves its change for the caller already notifying.
    fn notify(&self, state: &Mutex<ListState<T>>) {
        {
            let mut guard = state.lock();
            if guard.notifying {
                return;
            }
            guard.notifying = true;
        }

        let _guard = NotifyGuard { state };
        let listeners = self.changes.upgrade();

        loop {
            let next = {
                let mut guard = state.lock();
                match guard.changes.pop_front() {
                    Some(change) => change,
                    None => {
                        guard.notifying = false;
                        break;
                    }
                }
            };
            if let Some(listeners) = &listeners {
                listeners.emit(&next);
            }
        }
    }

    /// Apply everything held back during a `modify`, then reopen the gate.
    fn release(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        {
            let mut guard = state.lock();
            let Some(binding) = guard.current(self.epoch) else {
                return;
            };
            binding.gate = Gate::Draining;
        }

        loop {
            let (next, include) = {
                let mut guard = state.lock();
                let Some(binding) = guard.current(self.epoch) else {
                    return;
                };
                match binding.held.pop_front() {
                    Some(next) => (next, Arc::clone(&binding.include)),
                    None => {
                        binding.gate = Gate::Open;
                        return;
                    }
                }
            };
            self.process(next, &include, true);
        }
    }

    /// Reopen the gate without applying what was held. Used after a panic.
    fn reopen(&self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut guard = state.lock();
        if let Some(binding) = guard.current(self.epoch) {
            binding.gate = Gate::Open;
            binding.held.clear();
        }
    }

    fn snapshot_sink(&self) -> SnapshotSink<T> {
        let link = self.clone();
        Arc::new(move |items: &[Arc<T>]| link.receive(Incoming::Snapshot(items.to_vec())))
    }
}

/// Resets the notify flag if a change listener panics.
struct NotifyGuard<'a, T> {
    state: &'a Mutex<ListState<T>>,
}

impl<T> Drop for NotifyGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.state.lock();
            state.notifying = false;
            state.changes.clear();
        }
    }
}

/// Keeps the gate held for one `modify`; reopens it if the transform or a
/// listener panics.
struct Hold<'a, T: Entity> {
    link: &'a Link<T>,
    armed: bool,
}

impl<T: Entity> Hold<'_, T> {
    fn release(mut self) {
        self.link.release();
        self.armed = false;
    }
}

impl<T: Entity> Drop for Hold<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.link.reopen();
        }
    }
}

/// Owns an ordered list of entities and republishes it after every change.
///
/// Repository events are applied in delivery order:
///
/// | Event   | Match                             | Effect               |
/// |---------|-----------------------------------|----------------------|
/// | insert  | inclusion predicate accepts it    | append               |
/// | update  | first element with the same id    | swap in place        |
/// | remove  | first element, by reference       | delete, shift left   |
/// | replace | first element `previous`, by ref. | overwrite with next  |
///
/// Events that match nothing are dropped without a publication. A repository
/// event racing a reload can therefore be lost; callers that care re-read
/// the repository.
pub struct ListSynchronizer<T: Entity, R: Repository<T>> {
    repository: Arc<R>,
    state: Arc<Mutex<ListState<T>>>,
    changes: Arc<EventEmitter<ListChange<T>>>,
}

impl<T: Entity, R: Repository<T>> ListSynchronizer<T, R> {
    /// Create an uninitialized synchronizer for `repository`.
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            state: Arc::new(Mutex::new(ListState {
                binding: None,
                next_epoch: 1,
                changes: VecDeque::new(),
                notifying: false,
            })),
            changes: Arc::new(EventEmitter::new()),
        }
    }

    /// The repository this list listens to.
    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Bind to `source` and the repository, returning the list's feed.
    ///
    /// The feed starts at the empty list; values the source delivers during
    /// this call are already applied when it returns. `include` defaults to
    /// [`include_all`]. Any previous binding is disconnected first, and its
    /// feed stops receiving values.
    pub fn init<S>(&self, source: &S, include: Option<IncludeFn<T>>) -> Feed<T>
    where
        S: SnapshotSource<T> + ?Sized,
    {
        self.disconnect();

        let include: IncludeFn<T> = match include {
            Some(include) => include,
            None => Arc::new(include_all::<T>),
        };
        let feed = Feed::new();

        let epoch = {
            let mut state = self.state.lock();
            let epoch = state.next_epoch;
            state.next_epoch += 1;
            epoch
        };
        let link = self.link(epoch);

        let listeners = self.listen(&link);
        {
            let mut state = self.state.lock();
            state.binding = Some(Binding {
                epoch,
                items: Vec::new(),
                feed: feed.clone(),
                include,
                listeners,
                snapshot: None,
                gate: Gate::Open,
                held: VecDeque::new(),
            });
        }
        debug!(epoch, "list initialized");

        let subscription = source.subscribe(link.snapshot_sink());
        self.attach_snapshot(epoch, subscription);

        feed
    }

    /// Drop the binding: unsubscribe from the repository and the snapshot
    /// source, and clear the list.
    ///
    /// The feed keeps its last value. Does nothing when not bound, and is
    /// safe to call from inside any of the list's own callbacks.
    pub fn disconnect(&self) {
        let binding = self.state.lock().binding.take();
        let Some(mut binding) = binding else {
            return;
        };

        self.repository.on_inserted().off(binding.listeners.inserted);
        self.repository.on_updated().off(binding.listeners.updated);
        self.repository.on_removed().off(binding.listeners.removed);
        self.repository.on_replaced().off(binding.listeners.replaced);

        if let Some(mut subscription) = binding.snapshot.take() {
            subscription.unsubscribe();
        }

        debug!(
            epoch = binding.epoch,
            len = binding.items.len(),
            held = binding.held.len(),
            "list disconnected"
        );
    }

    /// Replace the list wholesale with every value `source` delivers.
    ///
    /// The previous snapshot source is unsubscribed; repository listeners
    /// stay as they are. Does nothing when not bound.
    pub fn reload<S>(&self, source: &S)
    where
        S: SnapshotSource<T> + ?Sized,
    {
        let (link, previous) = {
            let mut state = self.state.lock();
            let Some(binding) = state.binding.as_mut() else {
                trace!("reload ignored: list not connected");
                return;
            };
            (self.link(binding.epoch), binding.snapshot.take())
        };

        if let Some(mut previous) = previous {
            previous.unsubscribe();
        }
        debug!(epoch = link.epoch, "list reloading");

        let subscription = source.subscribe(link.snapshot_sink());
        self.attach_snapshot(link.epoch, subscription);
    }

    /// Rewrite the list through `transform` and publish the result.
    ///
    /// The transform gets the current entities as a lazy iterator and may
    /// reorder, filter or map them; its output is collected before
    /// publishing. Repository events and snapshot values arriving while it
    /// runs are applied afterwards, on top of the rewritten list. Runs
    /// synchronously. Does nothing when not bound, or when called from
    /// inside another `modify`.
    pub fn modify<F, I>(&self, transform: F)
    where
        F: FnOnce(std::vec::IntoIter<Arc<T>>) -> I,
        I: IntoIterator<Item = Arc<T>>,
    {
        let outcome =
            self.try_modify(|items| transform(items).into_iter().map(Ok::<_, Infallible>));
        if let Err(e) = outcome {
            trace!(error = %e, "modify skipped");
        }
    }

    /// Like [`modify`](Self::modify) for transforms that can fail.
    ///
    /// The first error aborts the rewrite: the list stays as it was, nothing
    /// is published and the error comes back as [`Error::Transform`]. Values
    /// held back in the meantime are still applied. A `try_modify` issued
    /// while another one is running fails with [`Error::ModifyInProgress`].
    pub fn try_modify<F, I, E>(&self, transform: F) -> Result<()>
    where
        F: FnOnce(std::vec::IntoIter<Arc<T>>) -> I,
        I: IntoIterator<Item = std::result::Result<Arc<T>, E>>,
        E: Display,
    {
        let (epoch, current) = {
            let mut state = self.state.lock();
            let Some(binding) = state.binding.as_mut() else {
                trace!("modify ignored: list not connected");
                return Ok(());
            };
            if binding.gate != Gate::Open {
                return Err(Error::ModifyInProgress);
            }
            binding.gate = Gate::Held;
            (binding.epoch, binding.items.clone())
        };
        let link = self.link(epoch);
        let hold = Hold {
            link: &link,
            armed: true,
        };

        let collected = transform(current.into_iter())
            .into_iter()
            .collect::<std::result::Result<Vec<_>, E>>();

        let outcome = match collected {
            Ok(items) => {
                let len = items.len();
                if link.commit(|binding| {
                    binding.items = items;
                    Some(Outcome::Rewritten)
                }) {
                    trace!(epoch, len, "list modified");
                }
                Ok(())
            }
            Err(e) => Err(Error::Transform(e.to_string())),
        };

        hold.release();
        outcome
    }

    /// The feed of the current binding.
    pub fn feed(&self) -> Result<Feed<T>> {
        self.state
            .lock()
            .binding
            .as_ref()
            .map(|b| b.feed.clone())
            .ok_or(Error::NotConnected)
    }

    /// Whether `init` has been called without a later `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.state.lock().binding.is_some()
    }

    /// Number of entities in the list (zero when not bound).
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .binding
            .as_ref()
            .map_or(0, |b| b.items.len())
    }

    /// Check if the list holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a callback for every accepted repository event.
    ///
    /// Changes reach listeners in the order they were applied. Change
    /// listeners survive `disconnect` and re-`init`.
    pub fn on_change(
        &self,
        callback: impl Fn(&ListChange<T>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.changes.on(callback)
    }

    /// Remove a change listener.
    pub fn off_change(&self, id: ListenerId) {
        self.changes.off(id);
    }

    fn link(&self, epoch: u64) -> Link<T> {
        Link {
            state: Arc::downgrade(&self.state),
            changes: Arc::downgrade(&self.changes),
            epoch,
        }
    }

    /// Store a snapshot subscription on the binding it was made for.
    ///
    /// If that binding is gone, or a newer reload already attached its own
    /// subscription, this one is torn down instead.
    fn attach_snapshot(&self, epoch: u64, mut subscription: Subscription) {
        {
            let mut state = self.state.lock();
            if let Some(binding) = state.current(epoch) {
                if binding.snapshot.is_none() {
                    binding.snapshot = Some(subscription);
                    return;
                }
            }
        }
        subscription.unsubscribe();
    }

    fn listen(&self, link: &Link<T>) -> RepositoryListeners {
        let inserted = {
            let link = link.clone();
            self.repository
                .on_inserted()
                .on(move |entity: &Arc<T>| link.receive(Incoming::Inserted(Arc::clone(entity))))
        };

        let updated = {
            let link = link.clone();
            self.repository
                .on_updated()
                .on(move |entity: &Arc<T>| link.receive(Incoming::Updated(Arc::clone(entity))))
        };

        let removed = {
            let link = link.clone();
            self.repository
                .on_removed()
                .on(move |entity: &Arc<T>| link.receive(Incoming::Removed(Arc::clone(entity))))
        };

        let replaced = {
            let link = link.clone();
            self.repository
                .on_replaced()
                .on(move |pair: &Replaced<T>| link.receive(Incoming::Replaced(pair.clone())))
        };

        RepositoryListeners {
            inserted,
            updated,
            removed,
            replaced,
        }
    }
}

impl<T: Entity, R: Repository<T>> Drop for ListSynchronizer<T, R> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: Entity, R: Repository<T>> std::fmt::Debug for ListSynchronizer<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ListSynchronizer")
            .field("connected", &state.binding.is_some())
            .field("epoch", &state.binding.as_ref().map(|b| b.epoch))
            .field("len", &state.binding.as_ref().map_or(0, |b| b.items.len()))
            .finish()
    }
}
