//! Store disposal signal

use tokio::sync::watch;

/// Owner side: disposing settles every operation holding a [`DisposeSignal`].
/// Dropping the disposer counts as disposal.
#[derive(Debug)]
pub struct Disposer {
    sender: watch::Sender<bool>,
}

impl Default for Disposer {
    fn default() -> Self {
        Self::new()
    }
}

impl Disposer {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    pub fn signal(&self) -> DisposeSignal {
        DisposeSignal {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn dispose(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_disposed(&self) -> bool {
        *self.sender.borrow()
    }
}

#[derive(Debug, Clone)]
pub struct DisposeSignal {
    receiver: watch::Receiver<bool>,
}

impl DisposeSignal {
    pub fn is_disposed(&self) -> bool {
        *self.receiver.borrow() || self.receiver.has_changed().is_err()
    }

    /// Resolves once the owner disposes or goes away
    pub async fn disposed(&mut self) {
        loop {
            if *self.receiver.borrow_and_update() {
                return;
            }
            if self.receiver.changed().await.is_err() {
                return;
            }
        }
    }
}
