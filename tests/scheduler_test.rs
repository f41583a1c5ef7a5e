//! Notification scheduling behavior: recurring evaluation, precise
//! firing, schedule replacement and stop idempotence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use funding_spread_bot::aggregator::Aggregator;
use funding_spread_bot::error::FetchResult;
use funding_spread_bot::exchanges::ExchangeAdapter;
use funding_spread_bot::models::{AssetSpread, FundingQuote};
use funding_spread_bot::scheduler::{AlertSink, NotificationScheduler, NotifyPolicy};

const CHAT: i64 = 42;

fn quote(exchange: &'static str, symbol: &str, rate: f64, eta_minutes: i64) -> FundingQuote {
    FundingQuote {
        exchange,
        symbol: symbol.to_string(),
        rate,
        price: Some(100.0),
        next_settlement: Some(Utc::now() + ChronoDuration::minutes(eta_minutes)),
        settlement_estimated: false,
    }
}

struct StaticAdapter {
    name: &'static str,
    quotes: Vec<FundingQuote>,
}

#[async_trait]
impl ExchangeAdapter for StaticAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self) -> FetchResult<Vec<FundingQuote>> {
        Ok(self.quotes.clone())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<(i64, String, i64)>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<(i64, String, i64)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn deliver(
        &self,
        chat_id: i64,
        spread: &AssetSpread,
        eta_minutes: i64,
    ) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((chat_id, spread.base_asset.clone(), eta_minutes));
        Ok(())
    }
}

fn scheduler_for(
    quotes_a: Vec<FundingQuote>,
    quotes_b: Vec<FundingQuote>,
) -> (Arc<NotificationScheduler>, Arc<RecordingSink>) {
    let aggregator = Arc::new(Aggregator::new(vec![
        Arc::new(StaticAdapter {
            name: "ExA",
            quotes: quotes_a,
        }),
        Arc::new(StaticAdapter {
            name: "ExB",
            quotes: quotes_b,
        }),
    ]));
    let sink = Arc::new(RecordingSink::default());
    let scheduler = NotificationScheduler::new(aggregator, Arc::clone(&sink) as Arc<dyn AlertSink>);
    (scheduler, sink)
}

fn policy(window: i64, threshold: f64, interval: u64) -> NotifyPolicy {
    NotifyPolicy {
        window_minutes: window,
        threshold_pct: threshold,
        interval_minutes: interval,
    }
}

#[tokio::test]
async fn evaluate_once_fires_inside_window_only() {
    // spread 1.2%, sooner-side ETA 25m, window 30m -> alert
    let (scheduler, sink) = scheduler_for(
        vec![quote("ExA", "BTCUSDT", 0.010, 25)],
        vec![quote("ExB", "BTCUSDT", -0.002, 300)],
    );
    assert!(scheduler.evaluate_once(CHAT, &policy(30, 1.0, 60)).await);
    assert_eq!(sink.events(), vec![(CHAT, "BTC".to_string(), 25)]);

    // same spread, sooner-side ETA 45m -> no alert
    let (scheduler, sink) = scheduler_for(
        vec![quote("ExA", "BTCUSDT", 0.010, 45)],
        vec![quote("ExB", "BTCUSDT", -0.002, 300)],
    );
    assert!(!scheduler.evaluate_once(CHAT, &policy(30, 1.0, 60)).await);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn evaluate_once_delivers_at_most_one_alert_per_tick() {
    // Two qualifying assets; only the best spread alerts this tick.
    let (scheduler, sink) = scheduler_for(
        vec![
            quote("ExA", "BTCUSDT", 0.010, 25),
            quote("ExA", "ETHUSDT", 0.020, 10),
        ],
        vec![
            quote("ExB", "BTCUSDT", -0.002, 300),
            quote("ExB", "ETHUSDT", -0.015, 15),
        ],
    );
    assert!(scheduler.evaluate_once(CHAT, &policy(30, 1.0, 60)).await);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, "ETH");
}

#[tokio::test(start_paused = true)]
async fn recurring_schedule_runs_first_evaluation_immediately() {
    let (scheduler, sink) = scheduler_for(
        vec![quote("ExA", "BTCUSDT", 0.010, 25)],
        vec![quote("ExB", "BTCUSDT", -0.002, 300)],
    );
    scheduler.start_recurring(CHAT, policy(30, 1.0, 60)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], (CHAT, "BTC".to_string(), 25));
    assert!(scheduler.is_active(CHAT).await);
    scheduler.stop(CHAT).await;
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_the_previous_policy() {
    let (scheduler, sink) = scheduler_for(
        vec![quote("ExA", "BTCUSDT", 0.010, 25)],
        vec![quote("ExB", "BTCUSDT", -0.002, 300)],
    );
    // First policy's threshold is unreachable; the replacement fires.
    scheduler.start_recurring(CHAT, policy(30, 99.0, 60)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(sink.events().is_empty());

    scheduler.start_recurring(CHAT, policy(30, 1.0, 60)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(sink.events().len(), 1);
    scheduler.stop(CHAT).await;
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_silences_timers() {
    let (scheduler, sink) = scheduler_for(
        vec![quote("ExA", "BTCUSDT", 0.010, 200)],
        vec![quote("ExB", "BTCUSDT", -0.002, 300)],
    );
    scheduler.start_recurring(CHAT, policy(30, 1.0, 1)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    scheduler.stop(CHAT).await;
    assert!(!scheduler.is_active(CHAT).await);
    // Second stop is a no-op.
    scheduler.stop(CHAT).await;
    assert!(!scheduler.is_active(CHAT).await);

    // Long after the old interval, nothing has fired.
    tokio::time::sleep(Duration::from_secs(7200)).await;
    assert!(sink.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn precise_mode_fires_immediately_inside_the_window() {
    let (scheduler, sink) = scheduler_for(
        vec![quote("ExA", "BTCUSDT", 0.010, 25)],
        vec![quote("ExB", "BTCUSDT", -0.002, 300)],
    );
    scheduler.enable_precise(CHAT, 1.0).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], (CHAT, "BTC".to_string(), 25));
    scheduler.stop(CHAT).await;
}

#[tokio::test(start_paused = true)]
async fn precise_mode_arms_quietly_outside_the_window() {
    let (scheduler, sink) = scheduler_for(
        vec![quote("ExA", "BTCUSDT", 0.010, 120)],
        vec![quote("ExB", "BTCUSDT", -0.002, 300)],
    );
    scheduler.enable_precise(CHAT, 1.0).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    // One-shot armed for later; nothing delivered yet.
    assert!(sink.events().is_empty());
    assert!(scheduler.is_active(CHAT).await);
    scheduler.stop(CHAT).await;
}

#[tokio::test(start_paused = true)]
async fn precise_fire_abandons_a_drifted_candidate_and_replans() {
    // One-shot armed ~90m out for a settlement 120m away. The wall clock
    // is then held at +80m while the timer runs its full delay, so the
    // fresh ETA at fire time (40m) sits past window + slack: the alert
    // must be abandoned and the schedule re-derived, not sent late.
    let start = Utc::now();
    let wall: Arc<Mutex<DateTime<Utc>>> = Arc::new(Mutex::new(start));

    let aggregator = Arc::new(Aggregator::new(vec![
        Arc::new(StaticAdapter {
            name: "ExA",
            quotes: vec![quote("ExA", "BTCUSDT", 0.010, 120)],
        }),
        Arc::new(StaticAdapter {
            name: "ExB",
            quotes: vec![quote("ExB", "BTCUSDT", -0.002, 300)],
        }),
    ]));
    let sink = Arc::new(RecordingSink::default());
    let clock_wall = Arc::clone(&wall);
    let scheduler = NotificationScheduler::with_clock(
        aggregator,
        Arc::clone(&sink) as Arc<dyn AlertSink>,
        Arc::new(move || *clock_wall.lock().unwrap()),
    );

    scheduler.enable_precise(CHAT, 1.0).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(sink.events().is_empty());

    *wall.lock().unwrap() = start + ChronoDuration::minutes(80);
    tokio::time::sleep(Duration::from_secs(91 * 60)).await;

    // Nothing was delivered stale, and re-planning kept the chat armed.
    assert!(sink.events().is_empty());
    assert!(scheduler.is_active(CHAT).await);
    scheduler.stop(CHAT).await;
}

#[tokio::test(start_paused = true)]
async fn precise_mode_skips_candidates_failing_the_tie_break() {
    // Sooner side (low, 10m) has the lower raw rate: not a candidate.
    let (scheduler, sink) = scheduler_for(
        vec![quote("ExA", "BTCUSDT", 0.005, 200)],
        vec![quote("ExB", "BTCUSDT", -0.015, 10)],
    );
    scheduler.enable_precise(CHAT, 1.0).await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert!(sink.events().is_empty());
    scheduler.stop(CHAT).await;
}
