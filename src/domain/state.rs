//! Immutable snapshot state published to observers

use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Store state as a sequence of immutable snapshots.
///
/// Writers apply reducer closures; readers derive values from the latest
/// snapshot or follow the stream of changes.
#[derive(Debug)]
pub struct StateContainer<S> {
    sender: watch::Sender<Arc<S>>,
}

impl<S> StateContainer<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(initial: S) -> Self {
        let (sender, _) = watch::channel(Arc::new(initial));
        Self { sender }
    }

    pub fn snapshot(&self) -> Arc<S> {
        self.sender.borrow().clone()
    }

    pub fn update<F>(&self, reducer: F)
    where
        F: FnOnce(&mut S),
    {
        self.sender.send_modify(|state| reducer(Arc::make_mut(state)));
    }

    /// Apply `reducer`; observers are woken only when it returns `true`
    pub fn update_if<F>(&self, reducer: F) -> bool
    where
        F: FnOnce(&mut S) -> bool,
    {
        self.sender.send_if_modified(|state| reducer(Arc::make_mut(state)))
    }

    pub fn replace(&self, state: S) {
        self.sender.send_replace(Arc::new(state));
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<S>> {
        self.sender.subscribe()
    }

    /// Current snapshot followed by every change
    pub fn changes(&self) -> WatchStream<Arc<S>> {
        WatchStream::new(self.subscribe())
    }
}

impl<S> Default for StateContainer<S>
where
    S: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(S::default())
    }
}
