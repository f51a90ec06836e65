// MIT License - Copyright (c) 2026 Peter Wright
// Message submission: numbering, encoding and enqueueing

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::codec::PayloadEncoder;
use crate::constants::MAX_SEQUENCE;
use crate::error::Result;
use crate::message::{EventParams, MessageType};
use crate::queue::{PendingMessage, SendQueue};
use crate::sender::EventSender;

/// Sequence and sent counters, kept apart from the queue and table locks.
#[derive(Debug, Default)]
struct Counters {
    sequence: u16,
    sent: u64,
}

impl Counters {
    /// Next sequence number: 1..=9999, wrapping back to 1.
    fn next(&mut self) -> u16 {
        self.sequence = if self.sequence >= MAX_SEQUENCE {
            1
        } else {
            self.sequence + 1
        };
        self.sent += 1;
        self.sequence
    }
}

struct DispatchInner {
    account: String,
    encoder: Arc<dyn PayloadEncoder>,
    counters: Mutex<Counters>,
    queue: Arc<SendQueue>,
    sender: EventSender,
}

/// The single entry point that puts new messages on the send queue.
///
/// Cheap to clone; the dialer and the poll scheduler share one instance so
/// notifications and routines are numbered and queued exactly like caller
/// events.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatchInner>,
}

impl Dispatcher {
    pub fn new(
        account: impl Into<String>,
        encoder: Arc<dyn PayloadEncoder>,
        queue: Arc<SendQueue>,
        sender: EventSender,
    ) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                account: account.into(),
                encoder,
                counters: Mutex::new(Counters::default()),
                queue,
                sender,
            }),
        }
    }

    /// Encode, number and enqueue a message, then make sure the sender is
    /// running. Returns the assigned sequence number.
    pub async fn submit(&self, message_type: MessageType, params: &EventParams) -> Result<u16> {
        let inner = &self.inner;
        let mut payload = inner.encoder.encode(message_type, &inner.account, params)?;
        if let Some(extra) = inner.encoder.extra(params) {
            payload.push_str(&extra);
        }

        let seq = inner.counters.lock().await.next();
        debug!("Queueing seq {} {} {}", seq, message_type, payload);

        inner
            .queue
            .push_back(PendingMessage {
                seq,
                message_type,
                payload,
            })
            .await;
        inner.sender.ensure_running().await;
        Ok(seq)
    }

    /// Total messages submitted.
    pub async fn sent(&self) -> u64 {
        self.inner.counters.lock().await.sent
    }

    pub async fn queued(&self) -> usize {
        self.inner.queue.len().await
    }

    pub fn sender(&self) -> &EventSender {
        &self.inner.sender
    }
}
