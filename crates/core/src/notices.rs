//! Kernel-side notice plumbing: a broadcast fan-out with a bounded
//! in-memory history for the CLI and for diagnostics.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, Notify, RwLock};
use tracing::debug;

use mantle_shared::{Notice, NoticeSender};

pub struct NoticeBus {
    tx: broadcast::Sender<Arc<Notice>>,
    history: RwLock<VecDeque<Arc<Notice>>>,
    max_history: usize,
}

impl NoticeBus {
    #[must_use]
    pub fn new(max_history: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(256);
        Arc::new(Self {
            tx,
            history: RwLock::new(VecDeque::new()),
            max_history,
        })
    }

    #[must_use]
    pub fn sender(&self) -> NoticeSender {
        NoticeSender::new(self.tx.clone())
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Notice>> {
        self.tx.subscribe()
    }

    pub async fn history(&self) -> Vec<Arc<Notice>> {
        self.history.read().await.iter().cloned().collect()
    }

    async fn record(&self, notice: Arc<Notice>) {
        let mut history = self.history.write().await;
        history.push_back(notice);
        // While loop handles bursts that overshoot the cap.
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// Drain emitted notices into the bounded history until shutdown.
    /// A lagged receiver just resubscribes to the live edge — notices are
    /// at-most-once by design.
    pub fn spawn_recorder(self: &Arc<Self>, shutdown: Arc<Notify>) {
        let bus = self.clone();
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = shutdown.notified() => {
                        debug!("notice recorder shutting down");
                        break;
                    }
                    received = rx.recv() => {
                        match received {
                            Ok(notice) => bus.record(notice).await,
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                debug!(missed = missed, "notice recorder lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_is_bounded() {
        let bus = NoticeBus::new(10);
        for i in 0..25 {
            bus.record(Arc::new(Notice::new(
                "test",
                serde_json::json!({ "i": i }),
                "tests",
            )))
            .await;
        }
        let history = bus.history().await;
        assert_eq!(history.len(), 10);
        assert_eq!(history[0].payload["i"], 15);
    }

    #[tokio::test]
    async fn recorder_captures_emitted_notices() {
        let bus = NoticeBus::new(100);
        let shutdown = Arc::new(Notify::new());
        bus.spawn_recorder(shutdown.clone());

        let sender = bus.sender();
        sender.emit(Notice::new("a.kind", serde_json::json!({}), "tests"));

        // Give the recorder task a beat to drain the channel.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let history = bus.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, "a.kind");
        shutdown.notify_waiters();
    }
}
