// MIT License - Copyright (c) 2026 Peter Wright
// Path polling, fail-over and routine messages

use std::sync::Arc;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::constants::{
    BACKUP_ZONE, CID_QUALIFIER_FAIL, CID_QUALIFIER_RESTORE, DEFAULT_ROUTINE_INTERVAL_SECS,
    MAIN_ZONE,
};
use crate::dispatch::Dispatcher;
use crate::error::{Dc09Error, Result};
use crate::message::{EventParams, MessageType};
use crate::table::{CellId, Network, PathTable};

const SECS_PER_DAY: i64 = 86_400;

bitflags! {
    /// What the scheduler currently has to do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SchedulerActivity: u8 {
        /// Main and/or back-up polling is configured
        const POLLING  = 0b01;
        /// At least one routine message is configured
        const ROUTINES = 0b10;
    }
}

/// Lifecycle of the scheduler's worker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Constructed, never started
    Idle,
    /// Worker loop active
    Running,
    /// Stop requested; the worker exits at the top of its next iteration
    Stopping,
    /// Worker exited; join before discarding
    Stopped,
}

/// Polling configuration. Intervals are in seconds.
#[derive(Debug, Clone, Default)]
pub struct PollSettings {
    pub main_interval: Option<u64>,
    pub backup_interval: Option<u64>,
    /// Template sent when a path is restored
    pub ok_message: Option<EventParams>,
    /// Template sent when a path fails
    pub fail_message: Option<EventParams>,
}

impl PollSettings {
    fn is_active(&self) -> bool {
        self.main_interval.is_some() || self.backup_interval.is_some()
    }
}

/// One recurring message and when it fires next.
#[derive(Debug, Clone)]
pub struct RoutineSchedule {
    pub params: EventParams,
    pub interval_secs: u64,
    pub next_due: DateTime<Utc>,
}

impl RoutineSchedule {
    /// Build a schedule from a routine definition.
    ///
    /// `interval` (seconds, default one day) and `start` (seconds after UTC
    /// midnight) are read from the parameters. Without `start` the routine is
    /// due immediately; with it, the first due time is the start of day plus
    /// `start`, moved forward in whole intervals until it is not in the past.
    pub fn new(params: EventParams, now: DateTime<Utc>) -> Result<Self> {
        let interval_secs = params
            .get_u64("interval")
            .unwrap_or(DEFAULT_ROUTINE_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(Dc09Error::InvalidInterval(0));
        }

        let mut next_due = match params.get_u64("start") {
            Some(start) => {
                let midnight = now - chrono::Duration::seconds(now.timestamp().rem_euclid(SECS_PER_DAY));
                after(midnight, start)
            }
            None => now,
        };
        if next_due < now {
            // Skip whole intervals at once rather than stepping
            let behind = (now - next_due).num_seconds().max(0) as u64;
            let steps = behind.div_ceil(interval_secs);
            next_due = after(next_due, steps.saturating_mul(interval_secs));
            while next_due < now {
                next_due = after(next_due, interval_secs);
            }
        }

        Ok(Self {
            params,
            interval_secs,
            next_due,
        })
    }

    /// Explicit `type`, else 3-character codes are Contact ID and everything
    /// else is SIA.
    pub fn message_type(&self) -> MessageType {
        MessageType::infer(&self.params).unwrap_or(MessageType::SiaDcs)
    }

    /// Event parameters without the scheduling keys.
    fn message_params(&self) -> EventParams {
        let mut params = self.params.clone();
        params.remove("interval");
        params.remove("start");
        params.remove("type");
        params
    }
}

/// Result of one scheduler iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// `Some(ok)` if main was polled this iteration
    pub main: Option<bool>,
    /// `Some(ok)` if back-up was polled this iteration
    pub backup: Option<bool>,
    /// Routine messages dispatched
    pub routines_sent: usize,
}

struct ScheduleState {
    lifecycle: SchedulerState,
    poll: PollSettings,
    retry_delay: Duration,
    /// `None` means due now
    main_next: Option<DateTime<Utc>>,
    backup_next: Option<DateTime<Utc>>,
    main_ok: bool,
    backup_ok: bool,
    /// Poll every configured cell until each network has been validated
    first: bool,
    poll_generation: u64,
    routines: Vec<RoutineSchedule>,
    routine_generation: u64,
    poll_count: u64,
    handle: Option<JoinHandle<()>>,
}

impl ScheduleState {
    fn activity(&self) -> SchedulerActivity {
        let mut activity = SchedulerActivity::empty();
        if self.poll.is_active() {
            activity |= SchedulerActivity::POLLING;
        }
        if !self.routines.is_empty() {
            activity |= SchedulerActivity::ROUTINES;
        }
        activity
    }
}

struct Shared {
    table: Arc<PathTable>,
    dispatcher: Dispatcher,
    state: Mutex<ScheduleState>,
}

/// Background worker polling the main and back-up networks and sending
/// routine messages.
///
/// Configuration can be replaced while the worker runs. Health flips are
/// reported through the [`Dispatcher`] with the configured ok/fail templates.
pub struct PollScheduler {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
}

impl PollScheduler {
    pub fn new(table: Arc<PathTable>, dispatcher: Dispatcher, retry_delay: Duration) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                table,
                dispatcher,
                state: Mutex::new(ScheduleState {
                    lifecycle: SchedulerState::Idle,
                    poll: PollSettings::default(),
                    retry_delay,
                    main_next: None,
                    backup_next: None,
                    main_ok: false,
                    backup_ok: false,
                    first: true,
                    poll_generation: 0,
                    routines: Vec::new(),
                    routine_generation: 0,
                    poll_count: 0,
                    handle: None,
                }),
            }),
            shutdown_tx,
        }
    }

    /// Replace the polling configuration. Due times and counters restart and
    /// the next iteration polls every configured cell.
    pub async fn set_poll(&self, settings: PollSettings, retry_delay: Option<Duration>) {
        let mut state = self.shared.state.lock().await;
        state.poll = settings;
        if let Some(delay) = retry_delay {
            state.retry_delay = delay;
        }
        state.main_next = None;
        state.backup_next = None;
        state.main_ok = false;
        state.backup_ok = false;
        state.first = true;
        state.poll_count = 0;
        state.poll_generation += 1;
    }

    /// Disable main and back-up polling, keeping routines.
    pub async fn clear_poll(&self) {
        self.set_poll(PollSettings::default(), None).await;
    }

    /// Replace the routine list. Nothing changes if any definition is invalid.
    pub async fn set_routines(&self, routines: Vec<EventParams>) -> Result<()> {
        let now = Utc::now();
        let schedules = routines
            .into_iter()
            .map(|params| RoutineSchedule::new(params, now))
            .collect::<Result<Vec<_>>>()?;

        let mut state = self.shared.state.lock().await;
        state.routines = schedules;
        state.routine_generation += 1;
        Ok(())
    }

    /// Spawn the worker if it is not running. A scheduler whose worker has
    /// exited is restarted.
    pub async fn start(&self) {
        let mut state = self.shared.state.lock().await;
        match state.lifecycle {
            SchedulerState::Running | SchedulerState::Stopping => return,
            SchedulerState::Idle | SchedulerState::Stopped => {}
        }
        // A stopped worker has already released the lock for good
        if let Some(old) = state.handle.take() {
            old.abort();
        }
        self.shutdown_tx.send_replace(false);
        state.lifecycle = SchedulerState::Running;
        let shared = self.shared.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        state.handle = Some(tokio::spawn(shared.run(shutdown_rx)));
        info!("Poll scheduler started ({:?})", state.activity());
    }

    /// Request the worker to stop and clear all configuration.
    pub async fn stop(&self) {
        let mut state = self.shared.state.lock().await;
        if state.lifecycle == SchedulerState::Running {
            state.lifecycle = SchedulerState::Stopping;
        }
        state.poll = PollSettings::default();
        state.routines.clear();
        state.poll_generation += 1;
        state.routine_generation += 1;
        self.shutdown_tx.send_replace(true);
        debug!("Poll scheduler stop requested");
    }

    /// Wait for the worker to exit.
    pub async fn join(&self) {
        let handle = self.shared.state.lock().await.handle.take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Poll scheduler join failed: {}", e);
        }
    }

    pub async fn state(&self) -> SchedulerState {
        self.shared.state.lock().await.lifecycle
    }

    pub async fn activity(&self) -> SchedulerActivity {
        self.shared.state.lock().await.activity()
    }

    /// Successful polls since polling was last configured.
    pub async fn poll_count(&self) -> u64 {
        self.shared.state.lock().await.poll_count
    }

    /// Whether the last poll of a network succeeded on any of its cells.
    pub async fn network_ok(&self, network: Network) -> bool {
        let state = self.shared.state.lock().await;
        match network {
            Network::Main => state.main_ok,
            Network::Backup => state.backup_ok,
        }
    }

    /// Run a single iteration inline at the given time, without the worker.
    pub async fn tick(&self, now: DateTime<Utc>) -> IterationReport {
        self.shared.run_iteration(now).await
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
        if let Ok(mut state) = self.shared.state.try_lock()
            && let Some(handle) = state.handle.take()
        {
            handle.abort();
        }
    }
}

impl Shared {
    async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            let delay = {
                let mut state = self.state.lock().await;
                if *shutdown_rx.borrow() || state.activity().is_empty() {
                    state.lifecycle = SchedulerState::Stopped;
                    info!("Poll scheduler stopped");
                    break;
                }
                state.retry_delay
            };

            self.run_iteration(Utc::now()).await;

            tokio::select! {
                _ = sleep(delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        self.state.lock().await.lifecycle = SchedulerState::Stopped;
                        break;
                    }
                }
            }
        }
    }

    async fn run_iteration(&self, now: DateTime<Utc>) -> IterationReport {
        let (settings, generation, first, main_next, backup_next) = {
            let state = self.state.lock().await;
            (
                state.poll.clone(),
                state.poll_generation,
                state.first,
                state.main_next,
                state.backup_next,
            )
        };
        let is_due = |next: Option<DateTime<Utc>>| next.is_none_or(|t| t <= now);

        let mut report = IterationReport::default();
        let mut successes = 0;

        let main_due = settings.main_interval.is_some() && is_due(main_next);
        if main_due {
            let (ok, n) = self.poll_network(Network::Main, first, &settings).await;
            report.main = Some(ok);
            successes += n;
        }

        // Back-up is also polled whenever main was due, so a main failure
        // is covered in the same iteration.
        let backup_due =
            settings.backup_interval.is_some() && (main_due || is_due(backup_next));
        if backup_due {
            let (ok, n) = self.poll_network(Network::Backup, first, &settings).await;
            report.backup = Some(ok);
            successes += n;
        }

        {
            let mut state = self.state.lock().await;
            if state.poll_generation == generation {
                state.poll_count += successes;

                if let (Some(interval), Some(ok)) = (settings.main_interval, report.main) {
                    state.main_ok = ok;
                    // Main is retried every iteration only while no network works
                    if ok || report.backup == Some(true) {
                        state.main_next = Some(after(now, interval));
                    }
                }
                if let (Some(interval), Some(ok)) = (settings.backup_interval, report.backup) {
                    state.backup_ok = ok;
                    if ok {
                        state.backup_next = Some(after(now, interval));
                    }
                }

                let main_done = settings.main_interval.is_none() || report.main == Some(true);
                let backup_done =
                    settings.backup_interval.is_none() || report.backup == Some(true);
                if state.first && main_done && backup_done {
                    state.first = false;
                }
            }
        }

        report.routines_sent = self.dispatch_routines(now).await;
        report
    }

    /// Poll the cells of one network, primary first, stopping at the first
    /// success unless every cell must be validated. Returns whether any cell
    /// answered and how many did.
    async fn poll_network(
        &self,
        network: Network,
        all_cells: bool,
        settings: &PollSettings,
    ) -> (bool, u64) {
        let mut polled = false;
        let mut successes = 0;

        for cell in CellId::of(network) {
            if polled && !all_cells {
                break;
            }
            let Some(path) = self.table.path(cell).await else {
                continue;
            };

            let ok = path.poll().await;
            let was_ok = self.table.set_health(cell, ok).await;
            debug!("Poll {} ({}): {}", cell, path.endpoint(), ok);

            if ok {
                polled = true;
                successes += 1;
                if !was_ok {
                    info!("Path {} restored", cell);
                    self.notify(settings.ok_message.as_ref(), network, true).await;
                }
            } else if was_ok {
                warn!("Path {} failed", cell);
                self.notify(settings.fail_message.as_ref(), network, false).await;
            }
        }

        (polled, successes)
    }

    /// Queue a path state notification built from a template.
    async fn notify(&self, template: Option<&EventParams>, network: Network, restored: bool) {
        let Some(template) = template else {
            return;
        };
        let mut params = template.clone();
        params.insert(
            "zone",
            match network {
                Network::Main => MAIN_ZONE,
                Network::Backup => BACKUP_ZONE,
            },
        );

        let Some(message_type) = MessageType::infer(&params) else {
            debug!("Notification template has no usable type, dropped");
            return;
        };
        if message_type == MessageType::AdmCid {
            params.insert(
                "q",
                if restored {
                    CID_QUALIFIER_RESTORE
                } else {
                    CID_QUALIFIER_FAIL
                },
            );
        }
        params.remove("type");

        if let Err(e) = self.dispatcher.submit(message_type, &params).await {
            warn!("Could not queue {} notification: {}", network.as_str(), e);
        }
    }

    /// Send every routine that is due and advance its due time.
    async fn dispatch_routines(&self, now: DateTime<Utc>) -> usize {
        let (due, generation) = {
            let state = self.state.lock().await;
            let due: Vec<(usize, RoutineSchedule)> = state
                .routines
                .iter()
                .enumerate()
                .filter(|(_, r)| r.next_due <= now)
                .map(|(i, r)| (i, r.clone()))
                .collect();
            (due, state.routine_generation)
        };
        if due.is_empty() {
            return 0;
        }

        for (_, routine) in &due {
            let message_type = routine.message_type();
            if let Err(e) = self
                .dispatcher
                .submit(message_type, &routine.message_params())
                .await
            {
                warn!("Could not queue routine message: {}", e);
            }
        }

        let mut state = self.state.lock().await;
        if state.routine_generation == generation {
            for (i, _) in &due {
                if let Some(r) = state.routines.get_mut(*i) {
                    r.next_due = after(r.next_due, r.interval_secs);
                }
            }
        }
        due.len()
    }
}

fn after(t: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    t + chrono::Duration::seconds(secs.min(i32::MAX as u64) as i64)
}
