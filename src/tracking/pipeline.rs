use crate::error::TrackError;
use crate::tracking::api::{connect_push_channel, fetch_order_snapshot};
use crate::tracking::countdown::{compute_remaining, Countdown, COUNTDOWN_TICK_MS};
use crate::tracking::notifications::{Notification, NotificationBuffer};
use crate::tracking::timeline::{derive_timeline, Timeline};
use crate::tracking::types::{
    matches_order, OrderSnapshot, OrderStatus, OrderStatusEvent, SyncPhase, TrackingConfig,
    TrackingStatusSnapshot,
};
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Derived-state updates published to subscribers. A `Snapshot` carries the
/// full recomputed view; `Countdown` alone is sent on minute ticks between
/// snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    Snapshot {
        snapshot: OrderSnapshot,
        timeline: Timeline,
        countdown: Countdown,
    },
    Countdown {
        countdown: Countdown,
    },
    Notification {
        notification: Notification,
    },
    Status {
        status: TrackingStatusSnapshot,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchApplyOutcome {
    Applied { terminal: bool },
    OutOfOrder { generation: u64, newest: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDirective {
    /// NotFound/Unauthorized: stop autonomous scheduling, surface the reason.
    Fatal,
    /// Transient failure under the bound: keep the last good snapshot, mark
    /// it stale, retry on the next scheduled tick.
    KeepLastGood,
    /// Transient failures reached the bound (or a repeated Unknown): surface
    /// a retryable error while keeping the stale snapshot visible.
    SurfaceError,
    /// Completion superseded by a newer applied fetch.
    Ignore,
}

/// Decides when fetches may be issued and which completions count.
///
/// Phases: `Polling` (push not confirmed, active cadence), `PushBacked`
/// (push is primary truth, polling is a slow safety net), `Terminal`
/// (completed/cancelled or fatal error; autonomous fetches stop for good).
#[derive(Debug)]
pub struct SchedulerState {
    phase: SyncPhase,
    in_flight: Option<u64>,
    next_generation: u64,
    last_applied_generation: Option<u64>,
    consecutive_failures: u32,
    tolerated_unknown: bool,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerState {
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Polling,
            in_flight: None,
            next_generation: 0,
            last_applied_generation: None,
            consecutive_failures: 0,
            tolerated_unknown: false,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Grants a generation for a new fetch, or `None` when one must not be
    /// issued. A due fetch that finds one in flight is skipped, never queued.
    /// Manual refreshes are granted even in `Terminal` but do not change the
    /// machine's autonomous behavior.
    pub fn begin_fetch(&mut self, manual: bool) -> Option<u64> {
        if self.in_flight.is_some() {
            return None;
        }
        if self.phase == SyncPhase::Terminal && !manual {
            return None;
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.in_flight = Some(generation);
        Some(generation)
    }

    /// Applies a successful completion. Results are accepted in completion
    /// order; anything at or below the newest applied generation is stale
    /// and discarded so an earlier-issued fetch can never overwrite a later
    /// one.
    pub fn apply_success(&mut self, generation: u64, status: OrderStatus) -> FetchApplyOutcome {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
        if let Some(newest) = self.last_applied_generation {
            if generation <= newest {
                return FetchApplyOutcome::OutOfOrder { generation, newest };
            }
        }

        self.last_applied_generation = Some(generation);
        self.consecutive_failures = 0;
        self.tolerated_unknown = false;
        if status.is_terminal() {
            self.phase = SyncPhase::Terminal;
        }
        FetchApplyOutcome::Applied {
            terminal: self.phase == SyncPhase::Terminal,
        }
    }

    pub fn apply_failure(
        &mut self,
        generation: u64,
        error: &TrackError,
        max_transient_failures: u32,
    ) -> FailureDirective {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
        if let Some(newest) = self.last_applied_generation {
            if generation <= newest {
                return FailureDirective::Ignore;
            }
        }

        if error.is_terminal() {
            self.phase = SyncPhase::Terminal;
            return FailureDirective::Fatal;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let repeated_unknown = match error {
            TrackError::Unknown(_) if !self.tolerated_unknown => {
                self.tolerated_unknown = true;
                false
            }
            TrackError::Unknown(_) => true,
            _ => false,
        };

        if repeated_unknown || self.consecutive_failures >= max_transient_failures {
            FailureDirective::SurfaceError
        } else {
            FailureDirective::KeepLastGood
        }
    }

    pub fn on_push_connected(&mut self) {
        if self.phase == SyncPhase::Polling {
            self.phase = SyncPhase::PushBacked;
        }
    }

    pub fn on_push_disconnected(&mut self) {
        if self.phase == SyncPhase::PushBacked {
            self.phase = SyncPhase::Polling;
        }
    }

    /// Cadence of autonomous re-validation fetches; `None` once terminal.
    pub fn autonomous_interval(&self, config: &TrackingConfig) -> Option<Duration> {
        match self.phase {
            SyncPhase::Polling => Some(Duration::from_millis(config.poll_interval_ms)),
            SyncPhase::PushBacked => Some(Duration::from_millis(config.push_backed_interval_ms)),
            SyncPhase::Terminal => None,
        }
    }
}

#[derive(Debug)]
enum PushSignal {
    Connected,
    Disconnected { reason: String },
    Event(OrderStatusEvent),
}

enum FrameDirective {
    Event(OrderStatusEvent),
    Skip,
    Closed,
}

fn handle_push_frame(message: Message) -> FrameDirective {
    match message {
        Message::Text(text_payload) => {
            let mut owned_payload = text_payload.into_bytes();
            match crate::tracking::types::parse_status_event_payload(owned_payload.as_mut_slice())
            {
                Ok(event) => FrameDirective::Event(event),
                Err(error) => {
                    debug!(%error, "skipping undecodable push frame");
                    FrameDirective::Skip
                }
            }
        }
        Message::Binary(mut binary_payload) => {
            match crate::tracking::types::parse_status_event_payload(binary_payload.as_mut_slice())
            {
                Ok(event) => FrameDirective::Event(event),
                Err(error) => {
                    debug!(%error, "skipping undecodable binary push frame");
                    FrameDirective::Skip
                }
            }
        }
        Message::Close(_) => FrameDirective::Closed,
        _ => FrameDirective::Skip,
    }
}

/// Push-channel listener scoped to one session: connects, forwards decoded
/// status events, and reconnects with capped exponential backoff. Exits only
/// on cancellation or when the session side hangs up.
async fn run_push_listener(
    push_url: String,
    signal_tx: mpsc::Sender<PushSignal>,
    cancel: CancellationToken,
) {
    let mut reconnect_attempt = 0_u32;

    while !cancel.is_cancelled() {
        match connect_push_channel(&push_url).await {
            Ok(mut stream) => {
                reconnect_attempt = 0;
                if signal_tx.send(PushSignal::Connected).await.is_err() {
                    return;
                }

                let disconnect_reason = loop {
                    let frame = tokio::select! {
                        _ = cancel.cancelled() => return,
                        next_message = stream.next() => next_message,
                    };

                    let Some(frame_result) = frame else {
                        break "push stream ended".to_string();
                    };

                    match frame_result {
                        Ok(message) => match handle_push_frame(message) {
                            FrameDirective::Event(event) => {
                                if signal_tx.send(PushSignal::Event(event)).await.is_err() {
                                    return;
                                }
                            }
                            FrameDirective::Skip => {}
                            FrameDirective::Closed => break "push stream closed".to_string(),
                        },
                        Err(error) => break format!("push frame error: {error}"),
                    }
                };

                if signal_tx
                    .send(PushSignal::Disconnected {
                        reason: disconnect_reason,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Err(error) => {
                debug!(%error, attempt = reconnect_attempt, "push channel connect failed");
            }
        }

        reconnect_attempt = reconnect_attempt.saturating_add(1);
        let delay = reconnect_delay(reconnect_attempt);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn spawn_fetch(
    client: &Client,
    config: &TrackingConfig,
    fetch_tx: &mpsc::Sender<(u64, Result<OrderSnapshot, TrackError>)>,
    generation: u64,
) {
    let client = client.clone();
    let config = config.clone();
    let fetch_tx = fetch_tx.clone();
    tokio::spawn(async move {
        let result = fetch_order_snapshot(&client, &config).await;
        let _ = fetch_tx.send((generation, result)).await;
    });
}

fn build_status(
    scheduler: &SchedulerState,
    config: &TrackingConfig,
    last_fetch_at_ms: Option<i64>,
    stale: bool,
    reason: &Option<String>,
    order_number: Option<&str>,
) -> TrackingStatusSnapshot {
    TrackingStatusSnapshot {
        phase: scheduler.phase(),
        poll_interval_ms: scheduler
            .autonomous_interval(config)
            .map(|interval| interval.as_millis() as u64),
        last_fetch_at_ms,
        in_flight: scheduler.in_flight(),
        stale,
        consecutive_failures: scheduler.consecutive_failures(),
        order_number: order_number.map(str::to_string),
        reason: reason.clone(),
    }
}

async fn publish_status(
    status_store: &Arc<RwLock<TrackingStatusSnapshot>>,
    updates: &broadcast::Sender<TrackerEvent>,
    status: TrackingStatusSnapshot,
) {
    {
        let mut writable = status_store.write().await;
        *writable = status.clone();
    }
    let _ = updates.send(TrackerEvent::Status { status });
}

/// One order's tracking session. Owns the poll timer, the countdown tick,
/// the push listener, and in-flight fetch tasks; everything is released on
/// every exit path via the cancellation token.
pub async fn run_tracking_session(
    config: TrackingConfig,
    status_store: Arc<RwLock<TrackingStatusSnapshot>>,
    notifications: Arc<Mutex<NotificationBuffer>>,
    updates: broadcast::Sender<TrackerEvent>,
    mut refresh_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    let client = Client::new();
    let mut scheduler = SchedulerState::new();
    let mut last_snapshot: Option<OrderSnapshot> = None;
    let mut last_fetch_at_ms: Option<i64> = None;
    let mut stale = false;
    let mut reason: Option<String> = None;

    let (fetch_tx, mut fetch_rx) = mpsc::channel::<(u64, Result<OrderSnapshot, TrackError>)>(4);
    let (push_tx, mut push_rx) = mpsc::channel::<PushSignal>(16);

    let push_cancel = cancel.child_token();
    let push_handle = config.push_url.clone().map(|push_url| {
        let listener_tx = push_tx.clone();
        let listener_cancel = push_cancel.clone();
        tokio::spawn(run_push_listener(push_url, listener_tx, listener_cancel))
    });

    let mut countdown_timer = tokio::time::interval(Duration::from_millis(COUNTDOWN_TICK_MS));
    countdown_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Immediate first fetch on session start.
    let mut poll_deadline = Instant::now();

    info!(
        order_reference = config.order_ref.reference(),
        push_enabled = config.push_url.is_some(),
        "tracking session started"
    );
    publish_status(
        &status_store,
        &updates,
        build_status(&scheduler, &config, None, false, &None, None),
    )
    .await;

    loop {
        let autonomous_interval = scheduler.autonomous_interval(&config);
        let countdown_target = last_snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.estimated_ready_at_ms);

        tokio::select! {
            _ = cancel.cancelled() => break,

            _ = tokio::time::sleep_until(poll_deadline), if autonomous_interval.is_some() => {
                match scheduler.begin_fetch(false) {
                    Some(generation) => spawn_fetch(&client, &config, &fetch_tx, generation),
                    None => debug!("scheduled fetch skipped, one already in flight"),
                }
                if let Some(interval) = autonomous_interval {
                    poll_deadline = Instant::now() + interval;
                }
                publish_status(
                    &status_store,
                    &updates,
                    build_status(
                        &scheduler,
                        &config,
                        last_fetch_at_ms,
                        stale,
                        &reason,
                        last_snapshot.as_ref().map(|s| s.order_number.as_str()),
                    ),
                )
                .await;
            }

            Some((generation, result)) = fetch_rx.recv() => {
                match result {
                    Ok(snapshot) => match scheduler.apply_success(generation, snapshot.status) {
                        FetchApplyOutcome::Applied { terminal } => {
                            last_fetch_at_ms = Some(now_unix_ms());
                            stale = false;
                            reason = None;

                            let timeline = derive_timeline(
                                snapshot.status,
                                snapshot.order_type,
                                &snapshot.status_history,
                            );
                            let countdown =
                                compute_remaining(snapshot.estimated_ready_at_ms, now_unix_ms());
                            let _ = updates.send(TrackerEvent::Snapshot {
                                snapshot: snapshot.clone(),
                                timeline,
                                countdown,
                            });
                            last_snapshot = Some(snapshot);

                            if terminal {
                                info!("order reached a terminal status, autonomous updates stop");
                                push_cancel.cancel();
                            }
                        }
                        FetchApplyOutcome::OutOfOrder { generation, newest } => {
                            debug!(generation, newest, "discarding out-of-order fetch completion");
                        }
                    },
                    Err(error) => {
                        match scheduler.apply_failure(
                            generation,
                            &error,
                            config.max_transient_failures,
                        ) {
                            FailureDirective::Fatal => {
                                warn!(%error, "fetch failed terminally, autonomous updates stop");
                                reason = Some(error.to_string());
                                push_cancel.cancel();
                            }
                            FailureDirective::SurfaceError => {
                                warn!(
                                    %error,
                                    failures = scheduler.consecutive_failures(),
                                    "fetch failures persist, surfacing retryable error"
                                );
                                stale = last_snapshot.is_some();
                                reason = Some(error.to_string());
                            }
                            FailureDirective::KeepLastGood => {
                                debug!(%error, "transient fetch failure, keeping last good snapshot");
                                stale = last_snapshot.is_some();
                            }
                            FailureDirective::Ignore => {
                                debug!(generation, "ignoring failure of superseded fetch");
                            }
                        }
                    }
                }
                publish_status(
                    &status_store,
                    &updates,
                    build_status(
                        &scheduler,
                        &config,
                        last_fetch_at_ms,
                        stale,
                        &reason,
                        last_snapshot.as_ref().map(|s| s.order_number.as_str()),
                    ),
                )
                .await;
            }

            Some(signal) = push_rx.recv() => {
                match signal {
                    PushSignal::Connected => {
                        info!("push channel connected, relaxing poll cadence");
                        scheduler.on_push_connected();
                        if let Some(interval) = scheduler.autonomous_interval(&config) {
                            poll_deadline = Instant::now() + interval;
                        }
                    }
                    PushSignal::Disconnected { reason: why } => {
                        warn!(reason = %why, "push channel lost, returning to active polling");
                        scheduler.on_push_disconnected();
                        // Revalidate immediately after losing the channel.
                        poll_deadline = Instant::now();
                    }
                    PushSignal::Event(event) => {
                        let relevant = last_snapshot
                            .as_ref()
                            .map(|snapshot| {
                                matches_order(&event.order_number, &snapshot.order_number)
                            })
                            // No snapshot yet: trust the subscription scope.
                            .unwrap_or(true);

                        if relevant {
                            let notification = Notification::from_event(&event);
                            let inserted = notifications.lock().append(notification.clone());
                            if inserted {
                                let _ = updates.send(TrackerEvent::Notification { notification });
                            }
                            // Out-of-band fetch; the poll deadline is not touched.
                            if let Some(generation) = scheduler.begin_fetch(false) {
                                spawn_fetch(&client, &config, &fetch_tx, generation);
                            }
                        } else {
                            debug!(
                                event_order = %event.order_number,
                                "push event for a different order, ignored"
                            );
                        }
                    }
                }
                publish_status(
                    &status_store,
                    &updates,
                    build_status(
                        &scheduler,
                        &config,
                        last_fetch_at_ms,
                        stale,
                        &reason,
                        last_snapshot.as_ref().map(|s| s.order_number.as_str()),
                    ),
                )
                .await;
            }

            _ = countdown_timer.tick(),
                if countdown_target.is_some() && scheduler.phase() != SyncPhase::Terminal =>
            {
                let countdown = compute_remaining(countdown_target, now_unix_ms());
                let _ = updates.send(TrackerEvent::Countdown { countdown });
            }

            Some(()) = refresh_rx.recv() => {
                if let Some(generation) = scheduler.begin_fetch(true) {
                    debug!(generation, "manual refresh fetch issued");
                    spawn_fetch(&client, &config, &fetch_tx, generation);
                    publish_status(
                        &status_store,
                        &updates,
                        build_status(
                            &scheduler,
                            &config,
                            last_fetch_at_ms,
                            stale,
                            &reason,
                            last_snapshot.as_ref().map(|s| s.order_number.as_str()),
                        ),
                    )
                    .await;
                } else {
                    debug!("manual refresh skipped, fetch already in flight");
                }
            }
        }
    }

    push_cancel.cancel();
    if let Some(handle) = push_handle {
        let _ = handle.await;
    }

    info!("tracking session stopped");
    publish_status(
        &status_store,
        &updates,
        TrackingStatusSnapshot {
            phase: scheduler.phase(),
            poll_interval_ms: None,
            last_fetch_at_ms,
            in_flight: false,
            stale,
            consecutive_failures: scheduler.consecutive_failures(),
            order_number: last_snapshot.map(|snapshot| snapshot.order_number),
            reason: Some("tracking stopped".to_string()),
        },
    )
    .await;
}

fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(6);
    let base_ms = 200_u64.saturating_mul(1_u64 << exponent);
    let jitter_ms = (now_unix_ms().unsigned_abs() % 250).min(249);
    Duration::from_millis((base_ms + jitter_ms).min(5_000))
}

pub fn now_unix_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis().min(i64::MAX as u128) as i64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::types::{
        DEFAULT_POLL_INTERVAL_MS, DEFAULT_PUSH_BACKED_INTERVAL_MS, OrderRef,
    };

    fn config() -> TrackingConfig {
        TrackingConfig {
            base_url: "https://orders.example.com/api".to_string(),
            push_url: Some("wss://orders.example.com/push".to_string()),
            order_ref: OrderRef::Id("ord-1".to_string()),
            auth_token: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            push_backed_interval_ms: DEFAULT_PUSH_BACKED_INTERVAL_MS,
            max_transient_failures: 3,
        }
    }

    fn network_error() -> TrackError {
        TrackError::Network("connection reset".to_string())
    }

    #[test]
    fn single_fetch_in_flight_is_enforced() {
        let mut scheduler = SchedulerState::new();

        let first = scheduler.begin_fetch(false);
        assert_eq!(first, Some(0));
        // A due fetch finding one in flight is skipped, not queued.
        assert_eq!(scheduler.begin_fetch(false), None);
        assert_eq!(scheduler.begin_fetch(true), None);

        scheduler.apply_success(0, OrderStatus::Preparing);
        assert_eq!(scheduler.begin_fetch(false), Some(1));
    }

    #[test]
    fn late_completion_of_superseded_generation_is_discarded() {
        let mut scheduler = SchedulerState::new();

        let first = scheduler.begin_fetch(false).expect("fetch should be granted");
        assert_eq!(
            scheduler.apply_success(first, OrderStatus::Received),
            FetchApplyOutcome::Applied { terminal: false }
        );

        let second = scheduler.begin_fetch(false).expect("fetch should be granted");
        assert_eq!(
            scheduler.apply_success(second, OrderStatus::Ready),
            FetchApplyOutcome::Applied { terminal: false }
        );

        // A delayed redelivery of the earlier result must not win.
        assert_eq!(
            scheduler.apply_success(first, OrderStatus::Received),
            FetchApplyOutcome::OutOfOrder {
                generation: first,
                newest: second
            }
        );
    }

    #[test]
    fn terminal_status_is_absorbing() {
        let mut scheduler = SchedulerState::new();

        let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
        assert_eq!(
            scheduler.apply_success(generation, OrderStatus::Completed),
            FetchApplyOutcome::Applied { terminal: true }
        );
        assert_eq!(scheduler.phase(), SyncPhase::Terminal);

        // No autonomous fetches after terminal.
        assert_eq!(scheduler.begin_fetch(false), None);
        assert_eq!(scheduler.autonomous_interval(&config()), None);

        // Manual refresh is still granted and leaves the phase alone.
        let manual = scheduler.begin_fetch(true).expect("manual refresh allowed");
        scheduler.apply_success(manual, OrderStatus::Completed);
        assert_eq!(scheduler.phase(), SyncPhase::Terminal);
        assert_eq!(scheduler.begin_fetch(false), None);
    }

    #[test]
    fn cancelled_status_is_terminal_too() {
        let mut scheduler = SchedulerState::new();
        let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
        scheduler.apply_success(generation, OrderStatus::Cancelled);
        assert_eq!(scheduler.phase(), SyncPhase::Terminal);
    }

    #[test]
    fn push_channel_switches_poll_cadence() {
        let mut scheduler = SchedulerState::new();
        let config = config();

        assert_eq!(
            scheduler.autonomous_interval(&config),
            Some(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
        );

        scheduler.on_push_connected();
        assert_eq!(scheduler.phase(), SyncPhase::PushBacked);
        assert_eq!(
            scheduler.autonomous_interval(&config),
            Some(Duration::from_millis(DEFAULT_PUSH_BACKED_INTERVAL_MS))
        );

        scheduler.on_push_disconnected();
        assert_eq!(scheduler.phase(), SyncPhase::Polling);
        assert_eq!(
            scheduler.autonomous_interval(&config),
            Some(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
        );
    }

    #[test]
    fn push_signals_do_not_resurrect_a_terminal_session() {
        let mut scheduler = SchedulerState::new();
        let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
        scheduler.apply_success(generation, OrderStatus::Completed);

        scheduler.on_push_connected();
        assert_eq!(scheduler.phase(), SyncPhase::Terminal);
        scheduler.on_push_disconnected();
        assert_eq!(scheduler.phase(), SyncPhase::Terminal);
    }

    #[test]
    fn transient_failures_escalate_at_the_bound() {
        let mut scheduler = SchedulerState::new();

        for expected in [
            FailureDirective::KeepLastGood,
            FailureDirective::KeepLastGood,
            FailureDirective::SurfaceError,
        ] {
            let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
            assert_eq!(
                scheduler.apply_failure(generation, &network_error(), 3),
                expected
            );
        }
        assert_eq!(scheduler.consecutive_failures(), 3);
        // Transient failures never stop scheduling.
        assert_ne!(scheduler.phase(), SyncPhase::Terminal);
    }

    #[test]
    fn success_resets_the_failure_counter() {
        let mut scheduler = SchedulerState::new();

        let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
        scheduler.apply_failure(generation, &network_error(), 3);
        assert_eq!(scheduler.consecutive_failures(), 1);

        let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
        scheduler.apply_success(generation, OrderStatus::Preparing);
        assert_eq!(scheduler.consecutive_failures(), 0);
    }

    #[test]
    fn unknown_errors_are_tolerated_once() {
        let mut scheduler = SchedulerState::new();
        let unknown = TrackError::Unknown("http 500".to_string());

        let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
        assert_eq!(
            scheduler.apply_failure(generation, &unknown, 5),
            FailureDirective::KeepLastGood
        );

        let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
        assert_eq!(
            scheduler.apply_failure(generation, &unknown, 5),
            FailureDirective::SurfaceError
        );
    }

    #[test]
    fn not_found_and_unauthorized_are_fatal() {
        for error in [TrackError::NotFound, TrackError::Unauthorized] {
            let mut scheduler = SchedulerState::new();
            let generation = scheduler.begin_fetch(false).expect("fetch should be granted");
            assert_eq!(
                scheduler.apply_failure(generation, &error, 3),
                FailureDirective::Fatal
            );
            assert_eq!(scheduler.phase(), SyncPhase::Terminal);
            assert_eq!(scheduler.begin_fetch(false), None);
        }
    }

    #[test]
    fn failure_of_superseded_fetch_is_ignored() {
        let mut scheduler = SchedulerState::new();

        let first = scheduler.begin_fetch(false).expect("fetch should be granted");
        scheduler.apply_success(first, OrderStatus::Preparing);

        assert_eq!(
            scheduler.apply_failure(first, &network_error(), 3),
            FailureDirective::Ignore
        );
        assert_eq!(scheduler.consecutive_failures(), 0);
    }

    #[test]
    fn status_snapshot_reflects_scheduler_state() {
        let mut scheduler = SchedulerState::new();
        let config = config();

        let status = build_status(&scheduler, &config, None, false, &None, None);
        assert_eq!(status.phase, SyncPhase::Polling);
        assert_eq!(status.poll_interval_ms, Some(DEFAULT_POLL_INTERVAL_MS));
        assert!(!status.in_flight);

        scheduler.begin_fetch(false);
        let status = build_status(&scheduler, &config, Some(1_000), true, &None, Some("ORD-1"));
        assert!(status.in_flight);
        assert!(status.stale);
        assert_eq!(status.order_number.as_deref(), Some("ORD-1"));
    }
}
