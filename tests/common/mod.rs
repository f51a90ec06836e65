// MIT License - Copyright (c) 2026 Peter Wright
// In-process DC09 receiver for integration tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use dc09_spt::{Dc09Codec, DialerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

/// How the receiver answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ack,
    Nak,
    /// Read the request and close without answering
    Hangup,
}

/// One request seen by the receiver.
#[derive(Debug, Clone)]
pub struct Received {
    pub id: String,
    pub seq: u16,
    pub payload: String,
    pub acked: bool,
}

struct Shared {
    mode: Mode,
    received: Vec<Received>,
}

pub struct FakeReceiver {
    port: u16,
    shared: Arc<Mutex<Shared>>,
    handle: JoinHandle<()>,
}

impl FakeReceiver {
    pub async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Mutex::new(Shared {
            mode,
            received: Vec::new(),
        }));

        let state = shared.clone();
        let handle = tokio::spawn(async move {
            let codec = Dc09Codec::new("0000", None, None);
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 1024];
                let n = match stream.read(&mut buf).await {
                    Ok(n) if n > 0 => n,
                    _ => continue,
                };
                let Some(mut request) = parse_request(&buf[..n]) else {
                    continue;
                };

                let mode = state.lock().unwrap().mode;
                request.acked = mode == Mode::Ack;
                let answer = match mode {
                    Mode::Ack => Some(codec.build_answer("ACK", request.seq, None)),
                    Mode::Nak => Some(codec.build_answer("NAK", 0, Some(Utc::now()))),
                    Mode::Hangup => None,
                };
                state.lock().unwrap().received.push(request);

                if let Some(answer) = answer {
                    let _ = stream.write_all(&answer).await;
                }
                let _ = stream.shutdown().await;
            }
        });

        Self {
            port,
            shared,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_mode(&self, mode: Mode) {
        self.shared.lock().unwrap().mode = mode;
    }

    /// Every request, polls included.
    pub fn received(&self) -> Vec<Received> {
        self.shared.lock().unwrap().received.clone()
    }

    /// Acknowledged data blocks, in arrival order.
    pub fn delivered(&self) -> Vec<Received> {
        self.received()
            .into_iter()
            .filter(|r| r.acked && r.id != "NULL")
            .collect()
    }

    pub fn polls(&self) -> usize {
        self.received().iter().filter(|r| r.id == "NULL").count()
    }
}

impl Drop for FakeReceiver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Extract ID, sequence and payload from a request frame.
fn parse_request(raw: &[u8]) -> Option<Received> {
    let text = std::str::from_utf8(raw).ok()?;
    let frame = text.trim_start_matches('\n').trim_end_matches('\r');
    let body = frame.get(8..)?.strip_prefix('"')?;
    let (id, rest) = body.split_once('"')?;
    let seq = rest.get(..4)?.parse().ok()?;
    let payload = match (rest.find('['), rest.rfind(']')) {
        (Some(i), Some(j)) if i < j => rest[i..=j].to_string(),
        _ => String::new(),
    };
    Some(Received {
        id: id.to_string(),
        seq,
        payload,
        acked: false,
    })
}

/// Dialer config with short timeouts for tests.
pub fn fast_config() -> DialerConfig {
    DialerConfig::builder()
        .account("1234")
        .path_timeout(Duration::from_millis(500))
        .send_retry_delay(Duration::from_millis(20))
        .poll_retry_delay(Duration::from_millis(50))
        .build()
}

/// Poll `check` until it returns true or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(5), async {
        while !check().await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
