// MIT License - Copyright (c) 2026 Peter Wright
// Polling, notifications and routines against in-process receivers

mod common;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{eventually, fast_config, FakeReceiver, Mode};
use dc09_spt::dispatch::Dispatcher;
use dc09_spt::path::TransmissionPath;
use dc09_spt::queue::SendQueue;
use dc09_spt::scheduler::PollScheduler;
use dc09_spt::sender::EventSender;
use dc09_spt::table::PathTable;
use dc09_spt::{
    CellId, Dc09Codec, Dialer, EventParams, Network, PathIdentity, PathOptions, PollSettings,
    SchedulerActivity, Slot, StandardPayloadEncoder,
};
use tokio::time::Duration;

const MAIN_PRIMARY: CellId = CellId::new(Network::Main, Slot::Primary);
const MAIN_SECONDARY: CellId = CellId::new(Network::Main, Slot::Secondary);
const BACKUP_PRIMARY: CellId = CellId::new(Network::Backup, Slot::Primary);
const BACKUP_SECONDARY: CellId = CellId::new(Network::Backup, Slot::Secondary);

struct Rig {
    table: Arc<PathTable>,
    dispatcher: Dispatcher,
    scheduler: PollScheduler,
}

impl Rig {
    fn new() -> Self {
        let table = Arc::new(PathTable::new());
        let queue = Arc::new(SendQueue::new());
        let sender = EventSender::new(queue.clone(), table.clone(), Duration::from_millis(20));
        let dispatcher = Dispatcher::new("1234", Arc::new(StandardPayloadEncoder), queue, sender);
        let scheduler =
            PollScheduler::new(table.clone(), dispatcher.clone(), Duration::from_millis(50));
        Self {
            table,
            dispatcher,
            scheduler,
        }
    }

    async fn add_path(&self, cell: CellId, receiver: &FakeReceiver) {
        let identity = PathIdentity {
            account: "1234".into(),
            key: None,
            receiver: None,
            line: None,
        };
        let path = TransmissionPath::new(
            "127.0.0.1",
            receiver.port(),
            identity,
            Box::new(Dc09Codec::new("1234", None, None)),
        )
        .with_timeout(Duration::from_millis(500));
        self.table.set(cell, Arc::new(path)).await;
    }

    async fn idle(&self) -> bool {
        let d = &self.dispatcher;
        eventually(|| async move { d.queued().await == 0 && !d.sender().is_active().await }).await
    }
}

fn template(code: &str) -> Option<EventParams> {
    Some(EventParams::new().with("code", code))
}

fn secs(t: DateTime<Utc>, s: i64) -> DateTime<Utc> {
    t + chrono::Duration::seconds(s)
}

fn payloads(receiver: &FakeReceiver) -> Vec<String> {
    receiver.delivered().into_iter().map(|r| r.payload).collect()
}

#[tokio::test]
async fn test_steady_main_path_notifies_once() {
    let main = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(10),
                backup_interval: None,
                ok_message: template("YK"),
                fail_message: template("YS"),
            },
            None,
        )
        .await;

    let t0 = Utc::now();
    let mut health = Vec::new();
    for i in 0..3 {
        let report = rig.scheduler.tick(secs(t0, 10 * i)).await;
        assert_eq!(report.main, Some(true));
        assert_eq!(report.backup, None);
        health.push(rig.table.is_healthy(MAIN_PRIMARY).await);
    }

    assert_eq!(health, vec![true, true, true]);
    assert_eq!(rig.dispatcher.sent().await, 1);
    assert_eq!(rig.scheduler.poll_count().await, 3);
    assert!(rig.scheduler.network_ok(Network::Main).await);

    assert!(rig.idle().await);
    assert_eq!(payloads(&main), vec!["[#1234|NYK1]"]);
}

#[tokio::test]
async fn test_main_poll_skips_secondary_once_primary_answers() {
    let primary = FakeReceiver::start(Mode::Hangup).await;
    let secondary = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &primary).await;
    rig.add_path(MAIN_SECONDARY, &secondary).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(10),
                ..Default::default()
            },
            None,
        )
        .await;

    let t0 = Utc::now();
    assert_eq!(rig.scheduler.tick(t0).await.main, Some(true));
    assert!(!rig.table.is_healthy(MAIN_PRIMARY).await);
    assert!(rig.table.is_healthy(MAIN_SECONDARY).await);

    // Not due yet
    assert_eq!(rig.scheduler.tick(secs(t0, 5)).await.main, None);

    assert_eq!(rig.scheduler.tick(secs(t0, 10)).await.main, Some(true));
    assert_eq!(primary.polls(), 2);
    assert_eq!(secondary.polls(), 2);

    primary.set_mode(Mode::Ack);
    assert_eq!(rig.scheduler.tick(secs(t0, 20)).await.main, Some(true));
    assert_eq!(primary.polls(), 3);
    assert_eq!(secondary.polls(), 2);
    assert!(rig.table.is_healthy(MAIN_PRIMARY).await);
}

#[tokio::test]
async fn test_backup_failure_notifies_exactly_once() {
    let main = FakeReceiver::start(Mode::Ack).await;
    let backup = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    rig.add_path(BACKUP_PRIMARY, &backup).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(10),
                backup_interval: Some(10),
                ok_message: None,
                fail_message: template("YS"),
            },
            None,
        )
        .await;

    let t0 = Utc::now();
    let report = rig.scheduler.tick(t0).await;
    assert_eq!((report.main, report.backup), (Some(true), Some(true)));
    assert_eq!(rig.dispatcher.sent().await, 0);

    backup.set_mode(Mode::Hangup);
    for i in 1..4 {
        let report = rig.scheduler.tick(secs(t0, 10 * i)).await;
        assert_eq!(report.backup, Some(false));
    }
    assert_eq!(rig.dispatcher.sent().await, 1);
    assert!(!rig.scheduler.network_ok(Network::Backup).await);

    assert!(rig.idle().await);
    assert_eq!(payloads(&main), vec!["[#1234|NYS2]"]);
}

#[tokio::test]
async fn test_unreachable_backup_does_not_speed_up_main_polls() {
    let main = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(180),
                backup_interval: Some(3600),
                ..Default::default()
            },
            None,
        )
        .await;

    let t0 = Utc::now();
    let mut mains = Vec::new();
    for i in 0..5 {
        mains.push(rig.scheduler.tick(secs(t0, 5 * i)).await.main);
    }
    assert_eq!(mains, vec![Some(true), None, None, None, None]);
    assert_eq!(main.polls(), 1);
    assert!(!rig.scheduler.network_ok(Network::Backup).await);

    assert_eq!(rig.scheduler.tick(secs(t0, 180)).await.main, Some(true));
    assert_eq!(main.polls(), 2);
}

#[tokio::test]
async fn test_main_failure_polls_backup_before_it_is_due() {
    let main = FakeReceiver::start(Mode::Ack).await;
    let backup = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    rig.add_path(BACKUP_PRIMARY, &backup).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(10),
                backup_interval: Some(3600),
                ..Default::default()
            },
            None,
        )
        .await;

    let t0 = Utc::now();
    let report = rig.scheduler.tick(t0).await;
    assert_eq!((report.main, report.backup), (Some(true), Some(true)));
    assert_eq!(backup.polls(), 1);

    // Main healthy and due, back-up not due: back-up still rides along
    let report = rig.scheduler.tick(secs(t0, 10)).await;
    assert_eq!((report.main, report.backup), (Some(true), Some(true)));
    assert_eq!(backup.polls(), 2);

    // Between main due times nothing is polled
    let report = rig.scheduler.tick(secs(t0, 12)).await;
    assert_eq!((report.main, report.backup), (None, None));

    main.set_mode(Mode::Hangup);
    let report = rig.scheduler.tick(secs(t0, 20)).await;
    assert_eq!((report.main, report.backup), (Some(false), Some(true)));
    assert_eq!(backup.polls(), 3);
    assert!(!rig.scheduler.network_ok(Network::Main).await);
}

#[tokio::test]
async fn test_backup_rescue_defers_main_retry() {
    let main = FakeReceiver::start(Mode::Hangup).await;
    let backup = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    rig.add_path(BACKUP_PRIMARY, &backup).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(10),
                backup_interval: Some(3600),
                ..Default::default()
            },
            None,
        )
        .await;

    let t0 = Utc::now();
    let report = rig.scheduler.tick(t0).await;
    assert_eq!((report.main, report.backup), (Some(false), Some(true)));
    assert_eq!(main.polls(), 1);

    // Next retry tick: main waits for its interval since back-up works
    let report = rig.scheduler.tick(secs(t0, 5)).await;
    assert_eq!((report.main, report.backup), (None, None));
    assert_eq!(main.polls(), 1);

    let report = rig.scheduler.tick(secs(t0, 10)).await;
    assert_eq!((report.main, report.backup), (Some(false), Some(true)));
    assert_eq!(main.polls(), 2);
    assert_eq!(backup.polls(), 2);
}

#[tokio::test]
async fn test_total_outage_keeps_main_due() {
    let main = FakeReceiver::start(Mode::Hangup).await;
    let backup = FakeReceiver::start(Mode::Hangup).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    rig.add_path(BACKUP_PRIMARY, &backup).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(10),
                backup_interval: Some(3600),
                ..Default::default()
            },
            None,
        )
        .await;

    let t0 = Utc::now();
    for i in 0..3 {
        let report = rig.scheduler.tick(secs(t0, i)).await;
        assert_eq!((report.main, report.backup), (Some(false), Some(false)));
    }
    assert_eq!(main.polls(), 3);
    assert_eq!(backup.polls(), 3);

    // Recovery of back-up alone pushes main out one interval
    backup.set_mode(Mode::Ack);
    let report = rig.scheduler.tick(secs(t0, 3)).await;
    assert_eq!((report.main, report.backup), (Some(false), Some(true)));
    let report = rig.scheduler.tick(secs(t0, 4)).await;
    assert_eq!((report.main, report.backup), (None, None));
    assert_eq!(main.polls(), 4);
}

#[tokio::test]
async fn test_contact_id_notifications_carry_qualifier() {
    let main = FakeReceiver::start(Mode::Ack).await;
    let spare = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    // Configured but never polled
    rig.add_path(BACKUP_SECONDARY, &spare).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(10),
                backup_interval: None,
                ok_message: template("350"),
                fail_message: template("350"),
            },
            None,
        )
        .await;

    let t0 = Utc::now();
    rig.scheduler.tick(t0).await;
    assert!(rig.idle().await);
    assert_eq!(payloads(&main), vec!["[#1234|1350 00 001]"]);

    main.set_mode(Mode::Hangup);
    rig.scheduler.tick(secs(t0, 10)).await;
    assert!(rig.idle().await);
    assert_eq!(payloads(&spare), vec!["[#1234|3350 00 001]"]);
    assert!(spare.delivered().iter().all(|r| r.id == "ADM-CID"));
    assert_eq!(spare.polls(), 0);
}

#[tokio::test]
async fn test_untyped_template_is_dropped() {
    let main = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    rig.scheduler
        .set_poll(
            PollSettings {
                main_interval: Some(10),
                ok_message: template("YKX1"),
                ..Default::default()
            },
            None,
        )
        .await;

    rig.scheduler.tick(Utc::now()).await;
    assert!(rig.table.is_healthy(MAIN_PRIMARY).await);
    assert_eq!(rig.dispatcher.sent().await, 0);
}

#[tokio::test]
async fn test_routine_type_inferred_from_code() {
    let main = FakeReceiver::start(Mode::Ack).await;
    let rig = Rig::new();
    rig.add_path(MAIN_PRIMARY, &main).await;
    rig.scheduler
        .set_routines(vec![
            EventParams::new().with("code", "602").with("interval", 60),
            EventParams::new().with("code", "RP").with("interval", 60),
        ])
        .await
        .unwrap();
    assert_eq!(rig.scheduler.activity().await, SchedulerActivity::ROUTINES);

    let now = secs(Utc::now(), 1);
    assert_eq!(rig.scheduler.tick(now).await.routines_sent, 2);
    assert_eq!(rig.scheduler.tick(now).await.routines_sent, 0);
    assert_eq!(rig.scheduler.tick(secs(now, 60)).await.routines_sent, 2);

    assert!(rig.idle().await);
    let delivered = main.delivered();
    assert_eq!(delivered.len(), 4);
    assert_eq!(delivered[0].id, "ADM-CID");
    assert_eq!(delivered[0].payload, "[#1234|1602 00 000]");
    assert_eq!(delivered[1].id, "SIA-DCS");
    assert_eq!(delivered[1].payload, "[#1234|NRP]");
    assert_eq!(main.polls(), 0);
}

#[tokio::test]
async fn test_dialer_polls_in_background() {
    let main = FakeReceiver::start(Mode::Ack).await;
    let dialer = Dialer::new(fast_config());
    dialer
        .set_path(Network::Main, Slot::Primary, PathOptions::new("127.0.0.1", main.port()))
        .await
        .unwrap();
    dialer
        .start_poll(
            PollSettings {
                main_interval: Some(60),
                ok_message: template("YK"),
                ..Default::default()
            },
            Duration::from_millis(50),
        )
        .await
        .unwrap();

    let m = &main;
    assert!(eventually(|| async move { !m.delivered().is_empty() }).await);
    assert_eq!(payloads(&main), vec!["[#1234|NYK1]"]);

    let d = &dialer;
    assert!(eventually(|| async move { d.state().await.poll.is_some_and(|p| p.count == 1) }).await);
    let poll = dialer.state().await.poll.unwrap();
    assert!(poll.polling);
    assert!(!poll.routines);
    assert_eq!(poll.count, 1);

    dialer.stop_poll().await;
    assert!(dialer.state().await.poll.is_none());
    assert_eq!(main.polls(), 1);
}

#[tokio::test]
async fn test_scheduler_exits_when_cleared() {
    let rig = Rig::new();
    rig.scheduler
        .set_routines(vec![EventParams::new().with("code", "RP").with("start", 0)])
        .await
        .unwrap();
    rig.scheduler.start().await;
    assert_eq!(
        rig.scheduler.state().await,
        dc09_spt::scheduler::SchedulerState::Running
    );

    rig.scheduler.set_routines(Vec::new()).await.unwrap();
    let s = &rig.scheduler;
    assert!(
        eventually(|| async move {
            s.state().await == dc09_spt::scheduler::SchedulerState::Stopped
        })
        .await
    );
    rig.scheduler.join().await;
}
