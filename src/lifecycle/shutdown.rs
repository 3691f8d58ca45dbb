//! Shutdown coordination.

use tokio::sync::broadcast;

/// Fans a single shutdown event out to the listener and the prober.
///
/// Receivers must subscribe before `trigger`; a late subscriber misses it.
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

    /// Signal every subscriber. Safe to call more than once.
    pub fn trigger(&self) {
        let delivered = self.tx.send(()).unwrap_or(0);
        tracing::debug!(subscribers = delivered, "Shutdown triggered");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve once `rx` sees the shutdown event or its sender is gone.
pub async fn wait(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn every_subscriber_is_released() {
        let shutdown = Shutdown::new();
        let a = tokio::spawn(wait(shutdown.subscribe()));
        let b = tokio::spawn(wait(shutdown.subscribe()));

        shutdown.trigger();
        shutdown.trigger();

        for task in [a, b] {
            tokio::time::timeout(Duration::from_secs(1), task)
                .await
                .expect("subscriber not released")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn dropping_the_sender_releases_waiters() {
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), wait(rx))
            .await
            .expect("waiter not released");
    }
}
