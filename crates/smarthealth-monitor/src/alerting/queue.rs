//! Bounded background delivery.
//!
//! Request handlers and the reminder loop enqueue messages and return
//! immediately. A fixed pool of workers drains the queue; each message is
//! attempted once and the outcome is only logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use smarthealth_core::Destination;

use super::notifier::Notifier;

fn default_capacity() -> usize {
    256
}

fn default_workers() -> usize {
    2
}

/// Queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Messages that may wait before new ones are dropped
    #[serde(default = "default_capacity")]
    pub queue_capacity: usize,

    /// Concurrent delivery tasks
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_capacity(),
            workers: default_workers(),
        }
    }
}

/// One queued message.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Where to send it
    pub destination: Destination,
    /// Body
    pub text: String,
    /// What produced it, for logs ("sos", "reminder")
    pub kind: &'static str,
}

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Default)]
pub struct QueueStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`QueueStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// Accepted into the queue
    pub enqueued: u64,
    /// Refused because the queue was full or closed
    pub dropped: u64,
    /// Delivered successfully
    pub delivered: u64,
    /// Attempted and failed
    pub failed: u64,
}

impl QueueStats {
    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Sending half of the delivery queue. Cheap to clone.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Notification>,
    stats: Arc<QueueStats>,
}

/// Worker pool draining a [`NotificationQueue`].
pub struct QueueWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl QueueWorkers {
    /// Wait until every worker has exited. Workers exit once all queue
    /// handles are dropped and the backlog is drained.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Notification worker ended abnormally");
            }
        }
    }
}

impl NotificationQueue {
    /// Create the queue and spawn its workers on the current runtime.
    pub fn start(notifier: Arc<dyn Notifier>, config: &QueueConfig) -> (Self, QueueWorkers) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(QueueStats::default());
        let workers = config.workers.max(1);

        let handles = (0..workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let notifier = Arc::clone(&notifier);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver only while waiting, not while delivering
                        let next = rx.lock().await.recv().await;
                        let Some(message) = next else { break };
                        deliver_once(worker, notifier.as_ref(), &stats, message).await;
                    }
                    debug!(worker, "Notification worker stopped");
                })
            })
            .collect();

        info!(
            workers,
            capacity = config.queue_capacity.max(1),
            transport = notifier.name(),
            "Notification queue started"
        );

        (Self { tx, stats }, QueueWorkers { handles })
    }

    /// Queue a message without waiting. Returns whether it was accepted; a
    /// full or closed queue drops the message with a warning.
    pub fn enqueue(&self, notification: Notification) -> bool {
        let kind = notification.kind;
        match self.tx.try_send(notification) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(n)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind,
                    destination = %n.destination,
                    "Notification queue full, message dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    kind,
                    destination = %n.destination,
                    "Notification queue closed, message dropped"
                );
                false
            }
        }
    }

    /// Convenience wrapper over [`NotificationQueue::enqueue`].
    pub fn send(
        &self,
        kind: &'static str,
        destination: Destination,
        text: impl Into<String>,
    ) -> bool {
        self.enqueue(Notification {
            destination,
            text: text.into(),
            kind,
        })
    }

    /// Current counters.
    pub fn stats(&self) -> QueueSnapshot {
        self.stats.snapshot()
    }
}

async fn deliver_once(
    worker: usize,
    notifier: &dyn Notifier,
    stats: &QueueStats,
    message: Notification,
) {
    match notifier.deliver(&message.destination, &message.text).await {
        Ok(()) => {
            stats.delivered.fetch_add(1, Ordering::Relaxed);
            debug!(
                worker,
                kind = message.kind,
                destination = %message.destination,
                transport = notifier.name(),
                "Notification delivered"
            );
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                worker,
                kind = message.kind,
                destination = %message.destination,
                transport = notifier.name(),
                error = %e,
                "Notification delivery failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::notifier::RecordingNotifier;

    fn dest(raw: &str) -> Destination {
        Destination::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_messages_delivered_once() {
        let notifier = Arc::new(RecordingNotifier::new());
        let (queue, workers) = NotificationQueue::start(notifier.clone(), &QueueConfig::default());

        assert!(queue.send("sos", dest("1"), "a"));
        assert!(queue.send("reminder", dest("2"), "b"));
        drop(queue);
        workers.join().await;

        assert_eq!(notifier.count(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_retried() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let (queue, workers) = NotificationQueue::start(notifier.clone(), &QueueConfig::default());

        queue.send("sos", dest("1"), "a");

        let settled = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while queue.stats().failed == 0 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(settled.is_ok());

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.delivered, 0);

        drop(queue);
        workers.join().await;
        assert_eq!(notifier.count(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops() {
        let notifier = Arc::new(RecordingNotifier::new());
        let config = QueueConfig {
            queue_capacity: 1,
            workers: 1,
        };
        let (queue, workers) = NotificationQueue::start(notifier.clone(), &config);

        // Nothing has yielded to the worker yet on a single-threaded runtime
        assert!(queue.send("reminder", dest("1"), "first"));
        assert!(!queue.send("reminder", dest("1"), "second"));

        let stats = queue.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.dropped, 1);

        drop(queue);
        workers.join().await;
        assert_eq!(notifier.count(), 1);
    }
}
