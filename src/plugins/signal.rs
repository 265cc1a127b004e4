//! Process-wide cooperative cancellation.

use std::sync::Arc;

use tokio::sync::watch;

/// Raises the abort signal. Held by whoever owns shutdown.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes the abort signal. Cheap to clone; handed to every plugin.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl AbortSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        abort_pair().1
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal is raised. Never resolves if the handle is
    /// dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
