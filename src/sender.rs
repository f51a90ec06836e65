// MIT License - Copyright (c) 2026 Peter Wright
// On-demand delivery worker

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::queue::{PendingMessage, SendQueue};
use crate::table::{CellId, PathTable};

/// Lifecycle of the delivery worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No worker task exists.
    NotRunning,
    /// A worker is draining the queue.
    Running,
    /// The worker found the queue empty and is returning; it must be joined
    /// before a new one is spawned.
    Exiting,
}

struct Worker {
    state: WorkerState,
    handle: Option<JoinHandle<()>>,
}

struct SenderInner {
    queue: Arc<SendQueue>,
    table: Arc<PathTable>,
    retry_delay: Duration,
    worker: Mutex<Worker>,
}

/// Drains the [`SendQueue`] across the [`PathTable`].
///
/// The worker task exists only while there is something to send: it is
/// spawned by [`ensure_running`](Self::ensure_running) and exits as soon as
/// the queue is empty.
#[derive(Clone)]
pub struct EventSender {
    inner: Arc<SenderInner>,
}

impl EventSender {
    pub fn new(queue: Arc<SendQueue>, table: Arc<PathTable>, retry_delay: Duration) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                queue,
                table,
                retry_delay,
                worker: Mutex::new(Worker {
                    state: WorkerState::NotRunning,
                    handle: None,
                }),
            }),
        }
    }

    /// Make sure a worker is draining the queue. Call after every enqueue.
    pub async fn ensure_running(&self) {
        let mut worker = self.inner.worker.lock().await;

        // A worker that died without passing through Exiting is treated as exited
        if worker.state == WorkerState::Running
            && worker.handle.as_ref().is_some_and(|h| h.is_finished())
        {
            warn!("Sender worker stopped unexpectedly");
            worker.state = WorkerState::Exiting;
        }

        if worker.state == WorkerState::Exiting {
            if let Some(handle) = worker.handle.take()
                && let Err(e) = handle.await
            {
                warn!("Sender worker join failed: {}", e);
            }
            worker.state = WorkerState::NotRunning;
        }

        if worker.state == WorkerState::NotRunning {
            worker.state = WorkerState::Running;
            let inner = self.inner.clone();
            worker.handle = Some(tokio::spawn(inner.run()));
            debug!("Sender worker spawned");
        }
    }

    pub async fn state(&self) -> WorkerState {
        self.inner.worker.lock().await.state
    }

    /// Whether a worker is currently draining the queue.
    pub async fn is_active(&self) -> bool {
        self.state().await == WorkerState::Running
    }
}

impl SenderInner {
    async fn run(self: Arc<Self>) {
        loop {
            let Some(message) = self.queue.pop_front().await else {
                // Re-check under the worker lock so an enqueue racing with
                // this exit always finds either a non-empty queue here or an
                // Exiting worker in ensure_running.
                let mut worker = self.worker.lock().await;
                if self.queue.is_empty().await {
                    worker.state = WorkerState::Exiting;
                    debug!("Send queue drained, sender worker exiting");
                    break;
                }
                continue;
            };

            if !self.deliver(&message).await {
                warn!(
                    "No path accepted seq {}, retrying in {:?}",
                    message.seq, self.retry_delay
                );
                self.queue.push_front(message).await;
                sleep(self.retry_delay).await;
            }
        }
    }

    /// Try known-good cells first, then every configured cell.
    async fn deliver(&self, message: &PendingMessage) -> bool {
        for cell in CellId::ALL {
            if let Some((path, true)) = self.table.snapshot(cell).await
                && path
                    .send_message(message.seq, message.message_type, &message.payload)
                    .await
            {
                debug!("Seq {} delivered via {}", message.seq, cell);
                return true;
            }
        }

        for cell in CellId::ALL {
            let Some(path) = self.table.path(cell).await else {
                continue;
            };
            if path
                .send_message(message.seq, message.message_type, &message.payload)
                .await
            {
                if !self.table.set_health(cell, true).await {
                    info!("Path {} accepted seq {}, marked ok", cell, message.seq);
                }
                return true;
            }
        }

        false
    }
}
