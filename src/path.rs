// MIT License - Copyright (c) 2026 Peter Wright
// One transmission path to a receiver

use std::sync::atomic::{AtomicI64, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use crate::codec::FrameCodec;
use crate::config::PathIdentity;
use crate::constants::{DEFAULT_PATH_TIMEOUT, POLL_SEQUENCE, RECEIVE_BUFFER_SIZE};
use crate::error::{Dc09Error, Result};
use crate::message::MessageType;

/// A single receiver endpoint.
///
/// Every [`poll`](Self::poll) or [`send_message`](Self::send_message) opens a
/// fresh TCP connection, writes one frame, performs one bounded read, and
/// closes the connection. Failures of any kind are logged and reported as
/// `false`; nothing propagates to the caller.
///
/// The path owns its offset: the value from each parsed answer is fed into
/// the next frame built for this path, and into no other.
pub struct TransmissionPath {
    host: String,
    port: u16,
    identity: PathIdentity,
    timeout: Duration,
    buffer_size: usize,
    codec: Box<dyn FrameCodec>,
    offset: AtomicI64,
}

impl TransmissionPath {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        identity: PathIdentity,
        codec: Box<dyn FrameCodec>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            identity,
            timeout: DEFAULT_PATH_TIMEOUT,
            buffer_size: RECEIVE_BUFFER_SIZE,
            codec,
            offset: AtomicI64::new(0),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn identity(&self) -> &PathIdentity {
        &self.identity
    }

    /// Offset that will be used for the next frame on this path.
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Send a supervision poll. Returns `true` on ACK.
    pub async fn poll(&self) -> bool {
        let frame = self.codec.build_poll(self.offset());
        self.transact(POLL_SEQUENCE, &frame).await
    }

    /// Send one event block. Returns `true` on ACK.
    pub async fn send_message(&self, seq: u16, message_type: MessageType, payload: &str) -> bool {
        let frame = self
            .codec
            .build_block(seq, message_type, payload, self.offset());
        self.transact(seq, &frame).await
    }

    async fn transact(&self, seq: u16, frame: &[u8]) -> bool {
        let result = match self.exchange(frame).await {
            Ok(raw) => self.codec.parse_answer(seq, &raw),
            Err(e) => Err(e),
        };

        match result {
            Ok(answer) => {
                if let Some(offset) = answer.offset {
                    self.offset.store(offset, Ordering::SeqCst);
                }
                if !answer.outcome.is_ack() {
                    warn!(
                        "Receiver {} answered {} to seq {}",
                        self.endpoint(),
                        answer.outcome,
                        seq
                    );
                }
                answer.outcome.is_ack()
            }
            Err(e) if e.is_transport_failure() => {
                debug!("Path {} unreachable (seq {}): {}", self.endpoint(), seq, e);
                false
            }
            Err(e) => {
                warn!("Path {} bad answer (seq {}): {}", self.endpoint(), seq, e);
                false
            }
        }
    }

    /// Connect, write the frame, read one answer, close.
    async fn exchange(&self, frame: &[u8]) -> Result<Vec<u8>> {
        let endpoint = self.endpoint();
        debug!("Connecting to {}", endpoint);

        let mut stream = timeout(self.timeout, TcpStream::connect((self.host.as_str(), self.port)))
            .await
            .map_err(|_| Dc09Error::ConnectTimeout {
                endpoint: endpoint.clone(),
            })??;

        let mut buf = vec![0u8; self.buffer_size];
        let io = async {
            stream.write_all(frame).await?;
            stream.read(&mut buf).await
        };
        let read = timeout(self.timeout, io).await;
        let _ = stream.shutdown().await;

        let n = read.map_err(|_| Dc09Error::ResponseTimeout { endpoint })??;
        if n == 0 {
            return Err(Dc09Error::ConnectionClosed);
        }
        buf.truncate(n);
        Ok(buf)
    }
}

impl std::fmt::Debug for TransmissionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmissionPath")
            .field("endpoint", &self.endpoint())
            .field("account", &self.identity.account)
            .field("offset", &self.offset())
            .finish()
    }
}
