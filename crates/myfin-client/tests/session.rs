//! End-to-end sessions driven through the event queue.
//!
//! Run with:
//!   cargo test -p myfin-client --test session

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use myfin_client::{
    Collaborators, Dispatcher, Event, MemoryNavigator, MemoryNotifier, SimulatedGateway, View,
};
use myfin_core::identity::Credentials;
use myfin_core::{AppConfig, EntryKind, EntryStatus};
use myfin_state::{login, StateDb};

// ── Helpers ───────────────────────────────────────────────────────────────────

/// One device with one logged-in identity. Each `run` is a fresh app
/// session over the same store.
struct Device {
    db: Arc<StateDb>,
    config: Arc<AppConfig>,
    notifier: MemoryNotifier,
    navigator: MemoryNavigator,
}

impl Device {
    fn new() -> Self {
        let db = Arc::new(StateDb::temporary().unwrap());
        let creds = Credentials {
            phone: "08031234567".into(),
            account_name: "Chidi Okafor".into(),
            account_number: "2233445566".into(),
            password: "4567".into(),
        };
        login(&db, &creds, t(0)).unwrap();
        Self {
            db,
            config: Arc::new(AppConfig::default()),
            notifier: MemoryNotifier::default(),
            navigator: MemoryNavigator::default(),
        }
    }

    /// Start a session at `start`, feed `events` through the queue, shut
    /// down and hand back the dispatcher.
    async fn run(
        &self,
        approve_payments: bool,
        start: DateTime<Utc>,
        events: Vec<(Event, DateTime<Utc>)>,
    ) -> Dispatcher {
        let collaborators = Collaborators {
            gateway: Box::new(SimulatedGateway { approve: approve_payments }),
            notifier: Box::new(self.notifier.clone()),
            navigator: Box::new(self.navigator.clone()),
        };
        let (mut dispatcher, sender, rx) =
            Dispatcher::open(self.db.clone(), self.config.clone(), collaborators);
        dispatcher.start(start).unwrap();

        let worker = tokio::spawn(dispatcher.run(rx));
        let mut last = start;
        for (event, at) in events {
            sender.send_at(event, at).await.unwrap();
            last = at;
        }
        sender.send_at(Event::Shutdown, last).await.unwrap();
        worker.await.unwrap()
    }

    fn saw(&self, title: &str) -> bool {
        self.notifier.notices().iter().any(|n| n.title == title)
    }
}

/// 2026-10-19 10:00 UTC plus `secs`.
fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap() + Duration::seconds(secs)
}

fn taps(count: i64, from: DateTime<Utc>) -> Vec<(Event, DateTime<Utc>)> {
    (0..count).map(|i| (Event::Mine, from + Duration::seconds(i))).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tasks_unlock_special_offer_and_payment_applies_it() {
    let device = Device::new();

    let mut events = vec![(Event::ClaimFreeGrant, t(1))];
    events.extend(taps(10, t(2)));
    events.push((Event::Mine, t(20)));

    let mut clock = 30;
    for task in &device.config.tasks {
        events.push((Event::TriggerTask(task.id.clone()), t(clock)));
        events.push((Event::PageHidden, t(clock)));
        clock += i64::from(task.dwell_secs.unwrap_or(0));
        events.push((Event::PageVisible, t(clock)));
        clock += 1;
    }
    events.push((Event::BuyPlan("Super Taps".into()), t(clock)));

    let dispatcher = device.run(true, t(0), events).await;
    let engine = dispatcher.engine();
    let snap = engine.snapshot().unwrap();
    assert_eq!(snap.capacity, 20);
    assert_eq!(snap.used_today, 10);
    assert!(snap.special_claimed);
    assert!(snap.free_claimed);
    assert_eq!(snap.balance, 10 * 250 - 100);

    let history = engine.history().unwrap();
    assert_eq!(history.len(), 11);
    assert_eq!((history[0].kind, history[0].amount), (EntryKind::Purchase, -100));
    assert!(history[1..].iter().all(|e| e.kind == EntryKind::Mined && e.amount == 250));
    assert!(history.windows(2).all(|w| w[0].id > w[1].id));

    let views: Vec<View> = device.navigator.visits().into_iter().map(|(v, _)| v).collect();
    assert_eq!(views, vec![View::Store, View::Store, View::Dashboard]);
    assert!(device.saw("All Tasks Completed!"));
    assert!(device.saw("Purchase successful"));
    assert!(dispatcher.pending_purchase().is_none());
}

#[tokio::test]
async fn declined_payment_leaves_state_untouched() {
    let device = Device::new();
    let before = device.run(false, t(0), vec![]).await.engine().snapshot().unwrap();

    let dispatcher = device
        .run(false, t(1), vec![(Event::BuyPlan("Gold Miner".into()), t(1))])
        .await;
    assert_eq!(dispatcher.engine().snapshot().unwrap(), before);
    assert!(dispatcher.engine().history().unwrap().is_empty());
    assert!(dispatcher.pending_purchase().is_none());
    assert!(device.saw("Payment cancelled"));
}

#[tokio::test]
async fn next_session_rolls_over_before_mining() {
    let device = Device::new();
    device
        .run(true, t(0), vec![(Event::BuyPlan("Newbie Taps".into()), t(1))])
        .await;

    let mut events = taps(5, t(2));
    events.push((Event::Mine, t(10)));
    let dispatcher = device.run(true, t(2), events).await;
    assert_eq!(dispatcher.engine().quota().remaining().unwrap(), 0);
    assert!(device.saw("Tap limit reached"));

    let tomorrow = t(0) + Duration::days(1);
    let dispatcher = device
        .run(true, tomorrow, vec![(Event::Mine, tomorrow + Duration::seconds(1))])
        .await;

    let snap = dispatcher.engine().snapshot().unwrap();
    assert_eq!(snap.used_today, 1);
    assert_eq!(snap.capacity, 5);
    assert_eq!(snap.balance, 6 * 250 - 100);
}

#[tokio::test]
async fn withdrawal_is_recorded_as_pending_once_threshold_is_met() {
    let device = Device::new();
    device
        .run(
            true,
            t(0),
            vec![
                (Event::RequestWithdrawal(5_000), t(1)),
                (Event::BuyPlan("Silver Miner".into()), t(2)),
            ],
        )
        .await;
    assert!(device.saw("Withdrawal unavailable"));

    let mut events = taps(200, t(10));
    events.push((Event::RequestWithdrawal(5_000), t(300)));
    let dispatcher = device.run(true, t(10), events).await;
    // 200 taps minus the plan price is still under the threshold.
    assert_eq!(dispatcher.engine().snapshot().unwrap().balance, 50_000 - 10_000);
    let history = dispatcher.engine().history().unwrap();
    assert!(history.iter().all(|e| e.kind != EntryKind::Withdrawal));

    dispatcher.engine().quota().grant_capacity(40).unwrap();
    let mut events = taps(40, t(500));
    events.push((Event::RequestWithdrawal(100), t(598)));
    events.push((Event::RequestWithdrawal(20_000), t(600)));
    let dispatcher = device.run(true, t(400), events).await;

    assert!(device.saw("Amount too small"));
    let history = dispatcher.engine().history().unwrap();
    let latest = &history[0];
    assert_eq!(latest.kind, EntryKind::Withdrawal);
    assert_eq!(latest.amount, -20_000);
    assert_eq!(latest.status, EntryStatus::Pending);
    assert_eq!(history.iter().filter(|e| e.kind == EntryKind::Withdrawal).count(), 1);
    assert_eq!(dispatcher.engine().snapshot().unwrap().balance, 30_000);
}
