//! Per-subscriber alert scheduling.
//!
//! Two policy variants share one subscriber store:
//! - *recurring poll* (`start_recurring`): evaluate the top spreads every
//!   N minutes against a window/threshold policy, at most one alert per
//!   tick;
//! - *precise firing* (`enable_precise`): place a one-shot timer so the
//!   alert lands just as the best candidate enters a fixed 30-minute
//!   pre-settlement window, re-validated at fire time and re-derived by
//!   an hourly coarse rescan.
//!
//! Timer ownership is strict: at most one live handle per subscriber per
//! category; replacing a schedule aborts the old handle before the new
//! one is installed, and every callback re-checks its policy generation
//! before producing a side effect.

pub mod policy;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::aggregator::Aggregator;
use crate::models::AssetSpread;

/// How many top spreads each evaluation considers.
const SCAN_POOL_SIZE: usize = 10;
/// Fixed pre-settlement window for the precise variant.
const PRECISE_WINDOW_MINUTES: i64 = 30;
/// Tolerated ETA drift at fire time before an alert is abandoned.
const STALE_SLACK_MINUTES: i64 = 3;
/// Safety lead so the fire check runs slightly before the window opens.
const SAFETY_LEAD: Duration = Duration::from_secs(5);
/// Minute-of-hour alignment for the coarse rescan.
const HOURLY_RESCAN_MINUTE: u32 = 7;

/// Recurring-poll policy chosen by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotifyPolicy {
    pub window_minutes: i64,
    pub threshold_pct: f64,
    pub interval_minutes: u64,
}

/// Delivery collaborator. Rendering and transport live behind this seam;
/// the scheduler only hands over the spread and the ETA at fire time.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(
        &self,
        chat_id: i64,
        spread: &AssetSpread,
        eta_minutes: i64,
    ) -> anyhow::Result<()>;
}

/// Wall-clock source. Production uses `Utc::now`; tests substitute a
/// controlled clock to drive ETA drift independently of timer delays.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct SubscriberState {
    generation: u64,
    recurring: Option<JoinHandle<()>>,
    one_shot: Option<JoinHandle<()>>,
}

impl SubscriberState {
    fn abort_all(&mut self) {
        if let Some(handle) = self.recurring.take() {
            handle.abort();
        }
        if let Some(handle) = self.one_shot.take() {
            handle.abort();
        }
    }
}

pub struct NotificationScheduler {
    aggregator: Arc<Aggregator>,
    sink: Arc<dyn AlertSink>,
    subscribers: Mutex<HashMap<i64, SubscriberState>>,
    next_generation: AtomicU64,
    clock: Clock,
}

impl NotificationScheduler {
    pub fn new(aggregator: Arc<Aggregator>, sink: Arc<dyn AlertSink>) -> Arc<Self> {
        Self::with_clock(aggregator, sink, Arc::new(Utc::now))
    }

    pub fn with_clock(
        aggregator: Arc<Aggregator>,
        sink: Arc<dyn AlertSink>,
        clock: Clock,
    ) -> Arc<Self> {
        Arc::new(Self {
            aggregator,
            sink,
            subscribers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            clock,
        })
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Variant A: replace any existing schedule for this chat with a
    /// recurring evaluation every `policy.interval_minutes`, first run
    /// immediate.
    pub async fn start_recurring(self: &Arc<Self>, chat_id: i64, policy: NotifyPolicy) {
        let generation = self.replace_state(chat_id).await;
        info!(
            "chat {chat_id}: recurring notifications on \
             (window {}m, threshold {:.2}%, every {}m)",
            policy.window_minutes, policy.threshold_pct, policy.interval_minutes
        );

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let interval = Duration::from_secs(policy.interval_minutes.max(1) * 60);
            loop {
                // Queued-but-not-started ticks must not fire once the
                // schedule is replaced or stopped; a tick already past
                // this check runs to completion.
                if !this.is_current(chat_id, generation).await {
                    return;
                }
                this.evaluate_once(chat_id, &policy).await;
                tokio::time::sleep(interval).await;
            }
        });
        self.install_recurring(chat_id, generation, handle).await;
    }

    /// Variant B: replace any existing schedule with precise
    /// pre-settlement firing plus an hourly coarse rescan.
    pub async fn enable_precise(self: &Arc<Self>, chat_id: i64, threshold_pct: f64) {
        let generation = self.replace_state(chat_id).await;
        info!("chat {chat_id}: precise notifications on (threshold {threshold_pct:.2}%)");

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // Immediate plan, then re-derive from scratch every hour at
            // a fixed minute offset so the schedule self-heals when
            // settlement times or rankings move.
            Arc::clone(&this)
                .plan_precise(chat_id, generation, threshold_pct)
                .await;
            loop {
                tokio::time::sleep(delay_to_minute_of_hour(HOURLY_RESCAN_MINUTE)).await;
                if !this.is_current(chat_id, generation).await {
                    return;
                }
                debug!("chat {chat_id}: hourly rescan");
                this.clear_one_shot(chat_id, generation).await;
                Arc::clone(&this)
                    .plan_precise(chat_id, generation, threshold_pct)
                    .await;
            }
        });
        self.install_recurring(chat_id, generation, handle).await;
    }

    /// Stop all notifications for this chat. Idempotent: a second call
    /// finds nothing to remove and is a no-op.
    pub async fn stop(&self, chat_id: i64) {
        let removed = self.subscribers.lock().await.remove(&chat_id);
        match removed {
            Some(mut state) => {
                state.abort_all();
                info!("chat {chat_id}: notifications off");
            }
            None => debug!("chat {chat_id}: stop with no active schedule"),
        }
    }

    /// One recurring-poll evaluation: scan best-first, deliver at most
    /// one alert for the first qualifying candidate, then stop scanning
    /// this tick. Returns whether an alert was delivered.
    pub async fn evaluate_once(&self, chat_id: i64, policy: &NotifyPolicy) -> bool {
        let spreads = self.aggregator.top_spreads(SCAN_POOL_SIZE).await;
        let now = self.now();
        for spread in &spreads {
            let Some(eta) = policy::qualifies(
                spread,
                policy.threshold_pct,
                policy.window_minutes,
                now,
            ) else {
                continue;
            };
            self.deliver(chat_id, spread, eta).await;
            return true;
        }
        false
    }

    /// Derive the precise schedule from a fresh scan: fire immediately
    /// when the best candidate is already inside the window, otherwise
    /// arm a one-shot just before the window opens.
    fn plan_precise(
        self: Arc<Self>,
        chat_id: i64,
        generation: u64,
        threshold_pct: f64,
    ) -> BoxFuture<'static, ()> {
        async move {
            if !self.is_current(chat_id, generation).await {
                return;
            }
            let spreads = self.aggregator.top_spreads(SCAN_POOL_SIZE).await;
            let now = self.now();
            let best = spreads.iter().find_map(|spread| {
                policy::precise_candidate_eta(spread, threshold_pct, now)
                    .map(|eta| (spread.clone(), eta))
            });

            let Some((spread, eta)) = best else {
                debug!("chat {chat_id}: no qualifying candidate, waiting for rescan");
                return;
            };

            if eta <= PRECISE_WINDOW_MINUTES {
                if !self.is_current(chat_id, generation).await {
                    return;
                }
                self.deliver(chat_id, &spread, eta).await;
                // Re-arm once this settlement has passed so the same
                // event does not alert twice.
                let this = Arc::clone(&self);
                let delay = Duration::from_secs(eta as u64 * 60 + 60);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    // Disown our own stored handle before re-planning
                    // installs a successor.
                    this.take_one_shot(chat_id, generation).await;
                    Arc::clone(&this)
                        .plan_precise(chat_id, generation, threshold_pct)
                        .await;
                });
                self.install_one_shot(chat_id, generation, handle).await;
                return;
            }

            // Sleep until the candidate enters the window, minus a small
            // safety lead so the fire check can re-validate first.
            let lead_minutes = (eta - PRECISE_WINDOW_MINUTES) as u64;
            let delay = Duration::from_secs(lead_minutes * 60).saturating_sub(SAFETY_LEAD);
            debug!(
                "chat {chat_id}: one-shot for {} in {}m (eta {}m)",
                spread.base_asset, lead_minutes, eta
            );
            let this = Arc::clone(&self);
            let base_asset = spread.base_asset.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                this.fire_one_shot(chat_id, generation, threshold_pct, base_asset)
                    .await;
            });
            self.install_one_shot(chat_id, generation, handle).await;
        }
        .boxed()
    }

    /// Fire check: re-validate the planned candidate against fresh data.
    /// If its ETA drifted past the window by more than the slack (or the
    /// candidate vanished), re-plan silently instead of sending a stale
    /// alert.
    async fn fire_one_shot(
        self: Arc<Self>,
        chat_id: i64,
        generation: u64,
        threshold_pct: f64,
        base_asset: String,
    ) {
        if !self.is_current(chat_id, generation).await {
            return;
        }
        // This task is the stored one-shot; disown the handle so the
        // follow-up install does not abort the task running it.
        self.take_one_shot(chat_id, generation).await;
        let spreads = self.aggregator.top_spreads(SCAN_POOL_SIZE).await;
        let now = self.now();
        let fresh = spreads.iter().find_map(|spread| {
            if spread.base_asset != base_asset {
                return None;
            }
            policy::precise_candidate_eta(spread, threshold_pct, now)
                .map(|eta| (spread.clone(), eta))
        });

        match fresh {
            Some((spread, eta))
                if !policy::is_stale(eta, PRECISE_WINDOW_MINUTES, STALE_SLACK_MINUTES) =>
            {
                if !self.is_current(chat_id, generation).await {
                    return;
                }
                self.deliver(chat_id, &spread, eta).await;
                let this = Arc::clone(&self);
                let delay = Duration::from_secs(eta.max(0) as u64 * 60 + 60);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    this.take_one_shot(chat_id, generation).await;
                    Arc::clone(&this)
                        .plan_precise(chat_id, generation, threshold_pct)
                        .await;
                });
                self.install_one_shot(chat_id, generation, handle).await;
            }
            _ => {
                debug!("chat {chat_id}: {base_asset} drifted out of window, re-planning");
                Arc::clone(&self)
                    .plan_precise(chat_id, generation, threshold_pct)
                    .await;
            }
        }
    }

    /// Hand one alert to the delivery collaborator. A failed send is
    /// logged and does not affect scheduling state.
    async fn deliver(&self, chat_id: i64, spread: &AssetSpread, eta_minutes: i64) {
        if let Err(err) = self.sink.deliver(chat_id, spread, eta_minutes).await {
            warn!("chat {chat_id}: alert delivery failed: {err:#}");
        }
    }

    /// Install a fresh state for the chat, aborting any previous timers,
    /// and return the new policy generation.
    async fn replace_state(&self, chat_id: i64) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut map = self.subscribers.lock().await;
        if let Some(previous) = map.get_mut(&chat_id) {
            previous.abort_all();
        }
        map.insert(
            chat_id,
            SubscriberState {
                generation,
                recurring: None,
                one_shot: None,
            },
        );
        generation
    }

    async fn is_current(&self, chat_id: i64, generation: u64) -> bool {
        self.subscribers
            .lock()
            .await
            .get(&chat_id)
            .is_some_and(|state| state.generation == generation)
    }

    async fn install_recurring(&self, chat_id: i64, generation: u64, handle: JoinHandle<()>) {
        let mut map = self.subscribers.lock().await;
        match map.get_mut(&chat_id) {
            Some(state) if state.generation == generation => {
                if let Some(old) = state.recurring.replace(handle) {
                    old.abort();
                }
            }
            // The schedule was replaced or stopped while we were
            // spawning; the new handle must not outlive it.
            _ => handle.abort(),
        }
    }

    async fn install_one_shot(&self, chat_id: i64, generation: u64, handle: JoinHandle<()>) {
        let mut map = self.subscribers.lock().await;
        match map.get_mut(&chat_id) {
            Some(state) if state.generation == generation => {
                if let Some(old) = state.one_shot.replace(handle) {
                    old.abort();
                }
            }
            _ => handle.abort(),
        }
    }

    /// Remove the stored one-shot handle without aborting it. Used by a
    /// one-shot callback to disown its own handle before installing a
    /// successor.
    async fn take_one_shot(&self, chat_id: i64, generation: u64) {
        let mut map = self.subscribers.lock().await;
        if let Some(state) = map.get_mut(&chat_id) {
            if state.generation == generation {
                state.one_shot = None;
            }
        }
    }

    async fn clear_one_shot(&self, chat_id: i64, generation: u64) {
        let mut map = self.subscribers.lock().await;
        if let Some(state) = map.get_mut(&chat_id) {
            if state.generation == generation {
                if let Some(handle) = state.one_shot.take() {
                    handle.abort();
                }
            }
        }
    }

    /// Whether the chat currently has any schedule installed.
    pub async fn is_active(&self, chat_id: i64) -> bool {
        self.subscribers.lock().await.contains_key(&chat_id)
    }
}

/// Delay until the next wall-clock instant whose minute-of-hour equals
/// `minute`, always strictly in the future.
fn delay_to_minute_of_hour(minute: u32) -> Duration {
    let now = Utc::now();
    let current = i64::from(now.minute()) * 60 + i64::from(now.second());
    let target = i64::from(minute) * 60;
    let mut wait = target - current;
    if wait <= 0 {
        wait += 3600;
    }
    Duration::from_secs(wait as u64)
}
