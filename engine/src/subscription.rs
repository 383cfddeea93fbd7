//! Subscription handles.

/// Owned teardown for something that delivers callbacks.
///
/// Calling [`unsubscribe`](Subscription::unsubscribe) runs the teardown at
/// most once. Dropping a `Subscription` does NOT tear it down; whoever owns
/// the handle decides when delivery stops.
#[must_use = "dropping a Subscription keeps its callbacks registered"]
pub struct Subscription {
    teardown: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Wrap a teardown closure.
    pub fn new(teardown: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A subscription with nothing left to tear down (a finished source).
    pub fn closed() -> Self {
        Self { teardown: None }
    }

    /// Stop delivery. Safe to call repeatedly.
    pub fn unsubscribe(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    /// Whether there is nothing left to tear down.
    pub fn is_closed(&self) -> bool {
        self.teardown.is_none()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}
