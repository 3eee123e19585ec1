use tokio::sync::broadcast;
use tracing::debug;

/// Buffer for pending expiry notifications per subscriber.
/// Notifications carry no payload, so a lagged subscriber loses nothing.
const SIGNAL_BUFFER_SIZE: usize = 16;

/// Process-wide "session expired" notification.
///
/// Any component may subscribe. Only the transport raises it, after it has
/// already cleared the persisted session store.
#[derive(Clone, Debug)]
pub struct ExpirySignal {
    tx: broadcast::Sender<()>,
}

impl ExpirySignal {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_BUFFER_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub(crate) fn raise(&self) {
        let receivers = self.tx.send(()).unwrap_or(0);
        debug!(receivers, "Expiry signal raised");
    }
}

impl Default for ExpirySignal {
    fn default() -> Self {
        Self::new()
    }
}
