// MIT License - Copyright (c) 2026 Peter Wright
// Pending message queue

use std::collections::VecDeque;

use tokio::sync::Mutex;

use crate::message::MessageType;

/// A fully encoded message waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Sequence number, 1..=9999
    pub seq: u16,
    pub message_type: MessageType,
    pub payload: String,
}

/// FIFO for new messages; a message that failed delivery goes back to the
/// front so it is retried before anything queued after it.
#[derive(Debug, Default)]
pub struct SendQueue {
    inner: Mutex<VecDeque<PendingMessage>>,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_back(&self, message: PendingMessage) {
        self.inner.lock().await.push_back(message);
    }

    /// Return a message for retry ahead of newer arrivals.
    pub async fn push_front(&self, message: PendingMessage) {
        self.inner.lock().await.push_front(message);
    }

    pub async fn pop_front(&self) -> Option<PendingMessage> {
        self.inner.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
