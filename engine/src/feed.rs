//! Replay-last-value broadcast of published snapshots.
//!
//! # Delivery model
//!
//! Publishing happens in two steps so the owner can keep its own state and
//! the feed's latest value in lockstep:
//!   - `stage` records the new value while the owner still holds its lock.
//!   - `flush` delivers every staged value to listeners and to the `watch`
//!     channel once the owner has released its lock.
//!
//! A listener that causes another publication (for example by calling back
//! into the list) does not receive the nested value mid-delivery: it is
//! queued behind the in-flight one, so every listener observes values in
//! publish order. Only one caller delivers at a time; the others leave their
//! values in the queue for it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::emitter::EventEmitter;
use crate::snapshot::Snapshot;
use crate::source::{SnapshotSink, SnapshotSource};
use crate::subscription::Subscription;

struct FeedState<T> {
    /// Most recently staged value.
    current: Snapshot<T>,
    /// Most recently handed to listeners; replayed to new subscribers.
    delivered: Snapshot<T>,
    /// Number of values taken off the queue for delivery so far.
    sequence: u64,
    /// Staged but not yet delivered.
    queue: VecDeque<Pending<T>>,
    /// Thread currently delivering, if any.
    drainer: Option<ThreadId>,
}

type Callback<T> = Arc<dyn Fn(&Snapshot<T>) + Send + Sync>;

enum Pending<T> {
    /// A published value for every listener.
    Publish(Snapshot<T>),
    /// The initial value for one subscriber that registered while another
    /// thread was delivering.
    Replay(Callback<T>, Snapshot<T>),
}

/// A snapshot on its way to listeners, numbered in delivery order.
struct Delivery<T> {
    sequence: u64,
    snapshot: Snapshot<T>,
}

struct FeedInner<T> {
    state: Mutex<FeedState<T>>,
    listeners: EventEmitter<Delivery<T>>,
    watch: watch::Sender<Snapshot<T>>,
}

/// A push-based stream of [`Snapshot`]s that always has a current value.
///
/// New subscribers immediately receive the latest delivered snapshot, then
/// every later one. Cloning a `Feed` yields another handle to the same feed.
pub struct Feed<T> {
    inner: Arc<FeedInner<T>>,
}

impl<T: Send + Sync + 'static> Feed<T> {
    /// Create a feed whose current value is the empty snapshot.
    pub(crate) fn new() -> Self {
        let initial = Snapshot::empty();
        let (watch, _) = watch::channel(initial.clone());
        Self {
            inner: Arc::new(FeedInner {
                state: Mutex::new(FeedState {
                    current: initial.clone(),
                    delivered: initial,
                    sequence: 0,
                    queue: VecDeque::new(),
                    drainer: None,
                }),
                listeners: EventEmitter::new(),
                watch,
            }),
        }
    }

    /// The latest published snapshot.
    pub fn latest(&self) -> Snapshot<T> {
        self.inner.state.lock().current.clone()
    }

    /// Register `callback` for this feed.
    ///
    /// The callback runs right away with the latest delivered snapshot and
    /// then once per publication, until the returned subscription is torn
    /// down.
    ///
    /// The replay always comes first, and the callback never sees a value
    /// twice. When no delivery is running, the replay takes the delivery
    /// role, so publications staged meanwhile follow it. From inside a
    /// listener, the replay is the value being delivered and anything queued
    /// behind it follows. While another thread is delivering, the replay is
    /// queued ahead of that thread's remaining values.
    pub fn subscribe(
        &self,
        callback: impl Fn(&Snapshot<T>) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: Callback<T> = Arc::new(callback);
        let me = thread::current().id();
        let (id, replay, delivering) = {
            let mut state = self.inner.state.lock();
            let cb = Arc::clone(&callback);
            let replayed = state.sequence;
            let id = self.inner.listeners.on(move |delivery: &Delivery<T>| {
                if delivery.sequence > replayed {
                    cb(&delivery.snapshot);
                }
            });
            let replay = state.delivered.clone();
            match state.drainer {
                None => {
                    state.drainer = Some(me);
                    (id, Some(replay), true)
                }
                Some(drainer) if drainer == me => (id, Some(replay), false),
                Some(_) => {
                    state
                        .queue
                        .push_front(Pending::Replay(Arc::clone(&callback), replay));
                    (id, None, false)
                }
            }
        };

        match (replay, delivering) {
            (Some(replay), true) => {
                let _guard = DrainGuard { inner: &self.inner };
                callback(&replay);
                self.drain();
            }
            (Some(replay), false) => callback(&replay),
            (None, _) => {}
        }

        let inner = Arc::clone(&self.inner);
        Subscription::new(move || inner.listeners.off(id))
    }

    /// A `watch` receiver for async consumers.
    ///
    /// Async consumers see the latest delivered value but may skip
    /// intermediate ones when several publications happen between two polls.
    /// Do not hold a `borrow()` of the receiver across a call that publishes
    /// on the same thread: delivery waits for that borrow to end.
    pub fn watch(&self) -> watch::Receiver<Snapshot<T>> {
        self.inner.watch.subscribe()
    }

    /// Whether both handles refer to the same feed.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of callback subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.size()
    }

    /// Record `snapshot` as the latest value without delivering it yet.
    pub(crate) fn stage(&self, snapshot: Snapshot<T>) {
        let mut state = self.inner.state.lock();
        state.current = snapshot.clone();
        state.queue.push_back(Pending::Publish(snapshot));
    }

    /// Deliver every staged snapshot, unless a delivery is already running
    /// further up the stack, in which case that one picks them up.
    pub(crate) fn flush(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.drainer.is_some() {
                return;
            }
            state.drainer = Some(thread::current().id());
        }

        let _guard = DrainGuard { inner: &self.inner };
        self.drain();
    }

    /// Deliver queued snapshots until the queue is empty. The caller holds
    /// the delivery role and a `DrainGuard`.
    fn drain(&self) {
        loop {
            let next = {
                let mut state = self.inner.state.lock();
                match state.queue.pop_front() {
                    Some(Pending::Publish(snapshot)) => {
                        state.sequence += 1;
                        state.delivered = snapshot.clone();
                        Delivery {
                            sequence: state.sequence,
                            snapshot,
                        }
                    }
                    Some(Pending::Replay(callback, snapshot)) => {
                        drop(state);
                        callback(&snapshot);
                        continue;
                    }
                    None => {
                        state.drainer = None;
                        break;
                    }
                }
            };
            self.inner.watch.send_replace(next.snapshot.clone());
            self.inner.listeners.emit(&next);
        }
    }

    /// Stage and deliver in one go.
    #[cfg(test)]
    pub(crate) fn publish(&self, snapshot: Snapshot<T>) {
        self.stage(snapshot);
        self.flush();
    }
}

/// Resets the drain flag if a listener panics mid-delivery.
struct DrainGuard<'a, T> {
    inner: &'a FeedInner<T>,
}

impl<T> Drop for DrainGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            let mut state = self.inner.state.lock();
            state.drainer = None;
            state.queue.clear();
            state.delivered = state.current.clone();
        }
    }
}

impl<T: Send + Sync + 'static> SnapshotSource<T> for Feed<T> {
    fn subscribe(&self, sink: SnapshotSink<T>) -> Subscription {
        Feed::subscribe(self, move |snapshot| sink(snapshot.as_slice()))
    }
}

impl<T> Clone for Feed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Feed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Feed")
            .field("len", &state.current.len())
            .field("pending", &state.queue.len())
            .field("subscribers", &self.inner.listeners.size())
            .finish()
    }
}
