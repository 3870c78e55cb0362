//! Shutdown coordination.

use tokio::sync::broadcast;

/// Broadcast handle that tells the server and every background loop to stop.
///
/// Each consumer holds its own receiver; loops spawned later take theirs
/// with `resubscribe` so one trigger reaches all of them.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Triggering with no listeners left is harmless.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Receivers still alive (server plus loops not yet stopped).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
