// MIT License - Copyright (c) 2026 Peter Wright
// Dialer: public facade over paths, queue, sender and scheduler

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};

use crate::codec::{Dc09CodecFactory, FrameCodecFactory, PayloadEncoder, StandardPayloadEncoder};
use crate::config::{DialerConfig, PathIdentity, PathOptions};
use crate::dispatch::Dispatcher;
use crate::error::{Dc09Error, Result};
use crate::message::{EventParams, MessageType};
use crate::path::TransmissionPath;
use crate::queue::SendQueue;
use crate::scheduler::{PollScheduler, PollSettings, SchedulerActivity};
use crate::sender::{EventSender, WorkerState};
use crate::table::{CellHealth, CellId, Network, PathTable, Slot};

const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Scheduler part of a [`DialerState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollState {
    pub polling: bool,
    pub routines: bool,
    /// Successful polls since polling was configured
    pub count: u64,
}

/// Point-in-time view of a dialer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialerState {
    /// Messages waiting for delivery
    pub queued: usize,
    /// Messages submitted since start
    pub sent: u64,
    /// Health of each configured cell
    pub paths: Vec<CellHealth>,
    /// Present while a scheduler exists
    pub poll: Option<PollState>,
    /// Present while a sender worker exists
    pub sender_active: Option<bool>,
}

/// Receiver and line defaults, adopted from the first path that sets them.
#[derive(Debug, Clone, Copy)]
struct Routing {
    receiver: Option<u32>,
    line: Option<u32>,
}

/// A SIA DC09 transmitter.
///
/// Owns up to four transmission paths (main/back-up network, primary/secondary
/// receiver), a send queue drained by an on-demand worker, and an optional
/// scheduler for polling and routine messages.
///
/// ```no_run
/// # async fn demo() -> dc09_spt::Result<()> {
/// use dc09_spt::{Dialer, DialerConfig, EventParams, Network, PathOptions, Slot};
///
/// let dialer = Dialer::new(DialerConfig::builder().account("1234").build());
/// dialer
///     .set_path(Network::Main, Slot::Primary, PathOptions::new("10.0.0.5", 12128))
///     .await?;
/// dialer
///     .send_message("SIA", &EventParams::new().with("code", "BA").with("zone", 3))
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Dialer {
    account: String,
    routing: Mutex<Routing>,
    path_timeout: Duration,
    receive_buffer_size: usize,
    poll_retry_delay: Duration,
    codec_factory: Arc<dyn FrameCodecFactory>,
    table: Arc<PathTable>,
    dispatcher: Dispatcher,
    scheduler: Mutex<Option<PollScheduler>>,
}

impl Dialer {
    /// Dialer with the built-in DC09 framing and payload encoding.
    pub fn new(config: DialerConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(StandardPayloadEncoder),
            Arc::new(Dc09CodecFactory),
        )
    }

    /// Dialer with caller-supplied payload encoding and framing.
    pub fn with_collaborators(
        config: DialerConfig,
        encoder: Arc<dyn PayloadEncoder>,
        codec_factory: Arc<dyn FrameCodecFactory>,
    ) -> Self {
        let table = Arc::new(PathTable::new());
        let queue = Arc::new(SendQueue::new());
        let sender = EventSender::new(queue.clone(), table.clone(), config.send_retry_delay);
        let dispatcher = Dispatcher::new(config.account.clone(), encoder, queue, sender);

        Self {
            account: config.account,
            routing: Mutex::new(Routing {
                receiver: config.receiver,
                line: config.line,
            }),
            path_timeout: config.path_timeout,
            receive_buffer_size: config.receive_buffer_size,
            poll_retry_delay: config.poll_retry_delay,
            codec_factory,
            table,
            dispatcher,
            scheduler: Mutex::new(None),
        }
    }

    /// Configure the path of one cell, replacing any existing one.
    ///
    /// Unset account, receiver and line come from the dialer. If the path
    /// sets a receiver or line the dialer has none for, the dialer adopts it.
    pub async fn set_path(&self, network: Network, slot: Slot, options: PathOptions) -> Result<()> {
        let mut routing = self.routing.lock().await;
        let identity = PathIdentity {
            account: options.account.clone().unwrap_or_else(|| self.account.clone()),
            key: options.key.clone(),
            receiver: options.receiver.or(routing.receiver),
            line: options.line.or(routing.line),
        };
        let codec = self.codec_factory.build(&identity)?;

        if routing.receiver.is_none() {
            routing.receiver = options.receiver;
        }
        if routing.line.is_none() {
            routing.line = options.line;
        }
        drop(routing);

        let path = TransmissionPath::new(options.host.clone(), options.port, identity, codec)
            .with_timeout(options.timeout.unwrap_or(self.path_timeout))
            .with_buffer_size(self.receive_buffer_size);
        let cell = CellId::new(network, slot);
        info!("Path {} set to {}", cell, options.endpoint());
        self.table.set(cell, Arc::new(path)).await;
        Ok(())
    }

    /// Remove the path of one cell. Removing an empty cell is a no-op.
    pub async fn del_path(&self, network: Network, slot: Slot) {
        let cell = CellId::new(network, slot);
        self.table.clear(cell).await;
        debug!("Path {} removed", cell);
    }

    /// Queue an event for delivery; `message_type` is `SIA`, `SIA-DCS`,
    /// `CID` or `ADM-CID`. Returns the sequence number assigned.
    pub async fn send_message(&self, message_type: &str, params: &EventParams) -> Result<u16> {
        let message_type: MessageType = message_type.parse()?;
        self.send(message_type, params).await
    }

    /// Typed form of [`send_message`](Self::send_message).
    pub async fn send(&self, message_type: MessageType, params: &EventParams) -> Result<u16> {
        self.dispatcher.submit(message_type, params).await
    }

    /// Start polling, or reconfigure a running scheduler.
    pub async fn start_poll(&self, settings: PollSettings, retry_delay: Duration) -> Result<()> {
        for interval in [settings.main_interval, settings.backup_interval].into_iter().flatten() {
            if interval == 0 {
                return Err(Dc09Error::InvalidInterval(0));
            }
        }

        let mut guard = self.scheduler.lock().await;
        let scheduler = guard.get_or_insert_with(|| self.new_scheduler(retry_delay));
        scheduler.set_poll(settings, Some(retry_delay)).await;
        scheduler.start().await;
        Ok(())
    }

    /// Stop polling. The scheduler keeps running while routines remain.
    pub async fn stop_poll(&self) {
        let mut guard = self.scheduler.lock().await;
        let Some(scheduler) = guard.as_ref() else {
            return;
        };
        if scheduler.activity().await.contains(SchedulerActivity::ROUTINES) {
            scheduler.clear_poll().await;
            return;
        }
        if let Some(scheduler) = guard.take() {
            scheduler.stop().await;
            scheduler.join().await;
        }
    }

    /// Replace the routine messages. An empty list with no polling
    /// configured stops the scheduler.
    pub async fn start_routines(&self, routines: Vec<EventParams>) -> Result<()> {
        let mut guard = self.scheduler.lock().await;
        if guard.is_none() {
            if routines.is_empty() {
                return Ok(());
            }
            let scheduler = self.new_scheduler(self.poll_retry_delay);
            scheduler.set_routines(routines).await?;
            scheduler.start().await;
            *guard = Some(scheduler);
            return Ok(());
        }

        let Some(scheduler) = guard.as_ref() else {
            return Ok(());
        };
        scheduler.set_routines(routines).await?;
        if scheduler.activity().await.is_empty() {
            if let Some(scheduler) = guard.take() {
                scheduler.stop().await;
                scheduler.join().await;
            }
        } else {
            scheduler.start().await;
        }
        Ok(())
    }

    pub async fn state(&self) -> DialerState {
        let poll = match self.scheduler.lock().await.as_ref() {
            Some(scheduler) => {
                let activity = scheduler.activity().await;
                Some(PollState {
                    polling: activity.contains(SchedulerActivity::POLLING),
                    routines: activity.contains(SchedulerActivity::ROUTINES),
                    count: scheduler.poll_count().await,
                })
            }
            None => None,
        };
        let sender_active = match self.dispatcher.sender().state().await {
            WorkerState::NotRunning => None,
            state => Some(state == WorkerState::Running),
        };

        DialerState {
            queued: self.dispatcher.queued().await,
            sent: self.dispatcher.sent().await,
            paths: self.table.configured().await,
            poll,
            sender_active,
        }
    }

    /// Wait until every queued message has been delivered. Returns false if
    /// the timeout elapsed first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.dispatcher.queued().await == 0 && !self.dispatcher.sender().is_active().await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(IDLE_CHECK_INTERVAL).await;
        }
    }

    /// Stop and join the scheduler. Queued messages are left to the sender.
    pub async fn shutdown(&self) {
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
            scheduler.join().await;
            info!("Dialer scheduler shut down");
        }
    }

    fn new_scheduler(&self, retry_delay: Duration) -> PollScheduler {
        PollScheduler::new(self.table.clone(), self.dispatcher.clone(), retry_delay)
    }
}
