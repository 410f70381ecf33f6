use crate::error::TrackError;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_PUSH_BACKED_INTERVAL_MS: u64 = 120_000;
pub const DEFAULT_MAX_TRANSIENT_FAILURES: u32 = 3;
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
pub const MAX_POLL_INTERVAL_MS: u64 = 300_000;
pub const MIN_PUSH_BACKED_INTERVAL_MS: u64 = 5_000;
pub const MAX_PUSH_BACKED_INTERVAL_MS: u64 = 600_000;
pub const MIN_MAX_TRANSIENT_FAILURES: u32 = 1;
pub const MAX_MAX_TRANSIENT_FAILURES: u32 = 10;

pub const STATUS_UPDATE_EVENT_TYPE: &str = "order_status_update";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Received,
    Preparing,
    Ready,
    OutForDelivery,
    Completed,
    Cancelled,
    /// Catch-all for server status values this build does not know about.
    #[serde(other)]
    Unknown,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::OutForDelivery => "out_for_delivery",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Collection,
    Delivery,
}

/// Lenient RFC 3339 parse. Server timestamps that fail to parse become
/// `None` rather than an error so one bad field never drops a snapshot.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.timestamp_millis()),
        Err(error) => {
            warn!(raw, %error, "unparseable server timestamp, treating as absent");
            None
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusHistoryEntryWire {
    pub status: OrderStatus,
    pub changed_at: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub changed_at_ms: Option<i64>,
    pub notes: Option<String>,
}

impl From<StatusHistoryEntryWire> for StatusHistoryEntry {
    fn from(value: StatusHistoryEntryWire) -> Self {
        Self {
            status: value.status,
            changed_at_ms: value.changed_at.as_deref().and_then(parse_timestamp_ms),
            notes: value.notes,
        }
    }
}

/// Trackable subset of the server's order payload. Monetary and line-item
/// fields are intentionally not modeled; serde skips them.
#[derive(Debug, Deserialize)]
pub struct OrderSnapshotWire {
    pub status: OrderStatus,
    pub order_type: OrderType,
    #[serde(default)]
    pub estimated_ready_time: Option<String>,
    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntryWire>,
    pub order_number: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub status: OrderStatus,
    pub order_type: OrderType,
    pub estimated_ready_at_ms: Option<i64>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub order_number: String,
}

impl From<OrderSnapshotWire> for OrderSnapshot {
    fn from(value: OrderSnapshotWire) -> Self {
        Self {
            status: value.status,
            order_type: value.order_type,
            estimated_ready_at_ms: value
                .estimated_ready_time
                .as_deref()
                .and_then(parse_timestamp_ms),
            status_history: value.status_history.into_iter().map(Into::into).collect(),
            order_number: value.order_number,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusEventWire {
    pub event: String,
    pub order_number: String,
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatusEvent {
    pub id: String,
    pub order_number: String,
    pub message: String,
    pub created_at_ms: Option<i64>,
}

impl TryFrom<OrderStatusEventWire> for OrderStatusEvent {
    type Error = TrackError;

    fn try_from(value: OrderStatusEventWire) -> Result<Self, Self::Error> {
        if value.event != STATUS_UPDATE_EVENT_TYPE {
            return Err(TrackError::InvalidArgument(format!(
                "unexpected event type '{}' on order status channel",
                value.event
            )));
        }
        if value.id.trim().is_empty() {
            return Err(TrackError::InvalidArgument(
                "status event id must be non-empty".to_string(),
            ));
        }

        Ok(Self {
            id: value.id,
            order_number: value.order_number,
            message: value.message,
            created_at_ms: value.created_at.as_deref().and_then(parse_timestamp_ms),
        })
    }
}

pub fn parse_status_event_payload(payload: &mut [u8]) -> Result<OrderStatusEvent, TrackError> {
    let wire: OrderStatusEventWire = simd_json::serde::from_slice(payload)?;
    wire.try_into()
}

/// Correlates a push event with the tracked order. The push channel carries
/// short ticket forms as well as full order numbers, so substring match in
/// either direction counts.
pub fn matches_order(event_number: &str, current_number: &str) -> bool {
    let event_number = event_number.trim();
    let current_number = current_number.trim();
    if event_number.is_empty() || current_number.is_empty() {
        return false;
    }
    event_number == current_number
        || current_number.contains(event_number)
        || event_number.contains(current_number)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Polling,
    PushBacked,
    Terminal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStatusSnapshot {
    pub phase: SyncPhase,
    pub poll_interval_ms: Option<u64>,
    pub last_fetch_at_ms: Option<i64>,
    pub in_flight: bool,
    pub stale: bool,
    pub consecutive_failures: u32,
    pub order_number: Option<String>,
    pub reason: Option<String>,
}

impl TrackingStatusSnapshot {
    pub fn idle(reason: Option<String>) -> Self {
        Self {
            phase: SyncPhase::Polling,
            poll_interval_ms: None,
            last_fetch_at_ms: None,
            in_flight: false,
            stale: false,
            consecutive_failures: 0,
            order_number: None,
            reason,
        }
    }
}

/// How the session addresses the order on the tracking endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Id(String),
    Ticket(String),
}

impl OrderRef {
    pub fn reference(&self) -> &str {
        match self {
            Self::Id(value) | Self::Ticket(value) => value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StartTrackingArgs {
    pub base_url: Option<String>,
    pub push_url: Option<String>,
    pub order_id: Option<String>,
    pub ticket: Option<String>,
    pub auth_token: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub push_backed_interval_ms: Option<u64>,
    pub max_transient_failures: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub base_url: String,
    pub push_url: Option<String>,
    pub order_ref: OrderRef,
    pub auth_token: Option<String>,
    pub poll_interval_ms: u64,
    pub push_backed_interval_ms: u64,
    pub max_transient_failures: u32,
}

impl StartTrackingArgs {
    pub fn normalize(self) -> Result<TrackingConfig, TrackError> {
        let base_url = self
            .base_url
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .unwrap_or_default();
        if base_url.is_empty() {
            return Err(TrackError::InvalidArgument(
                "baseUrl must be non-empty".to_string(),
            ));
        }

        let push_url = self
            .push_url
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let order_id = self
            .order_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let ticket = self
            .ticket
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let order_ref = match (order_id, ticket) {
            (Some(id), None) => OrderRef::Id(id),
            (None, Some(ticket)) => OrderRef::Ticket(ticket),
            (Some(_), Some(_)) => {
                return Err(TrackError::InvalidArgument(
                    "exactly one of orderId and ticket may be set".to_string(),
                ))
            }
            (None, None) => {
                return Err(TrackError::InvalidArgument(
                    "one of orderId or ticket is required".to_string(),
                ))
            }
        };

        let poll_interval_ms = self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&poll_interval_ms) {
            return Err(TrackError::InvalidArgument(format!(
                "pollIntervalMs must be between {MIN_POLL_INTERVAL_MS} and {MAX_POLL_INTERVAL_MS}"
            )));
        }

        let push_backed_interval_ms = self
            .push_backed_interval_ms
            .unwrap_or(DEFAULT_PUSH_BACKED_INTERVAL_MS);
        if !(MIN_PUSH_BACKED_INTERVAL_MS..=MAX_PUSH_BACKED_INTERVAL_MS)
            .contains(&push_backed_interval_ms)
        {
            return Err(TrackError::InvalidArgument(format!(
                "pushBackedIntervalMs must be between {MIN_PUSH_BACKED_INTERVAL_MS} and {MAX_PUSH_BACKED_INTERVAL_MS}"
            )));
        }
        if push_backed_interval_ms < poll_interval_ms {
            return Err(TrackError::InvalidArgument(
                "pushBackedIntervalMs must not be shorter than pollIntervalMs".to_string(),
            ));
        }

        let max_transient_failures = self
            .max_transient_failures
            .unwrap_or(DEFAULT_MAX_TRANSIENT_FAILURES);
        if !(MIN_MAX_TRANSIENT_FAILURES..=MAX_MAX_TRANSIENT_FAILURES)
            .contains(&max_transient_failures)
        {
            return Err(TrackError::InvalidArgument(format!(
                "maxTransientFailures must be between {MIN_MAX_TRANSIENT_FAILURES} and {MAX_MAX_TRANSIENT_FAILURES}"
            )));
        }

        Ok(TrackingConfig {
            base_url,
            push_url,
            order_ref,
            auth_token: self
                .auth_token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            poll_interval_ms,
            push_backed_interval_ms,
            max_transient_failures,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSessionInfo {
    pub running: bool,
    pub order_reference: String,
    pub push_enabled: bool,
    pub poll_interval_ms: u64,
    pub push_backed_interval_ms: u64,
    pub max_transient_failures: u32,
}

impl TrackingSessionInfo {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            running: true,
            order_reference: config.order_ref.reference().to_string(),
            push_enabled: config.push_url.is_some(),
            poll_interval_ms: config.poll_interval_ms,
            push_backed_interval_ms: config.push_backed_interval_ms,
            max_transient_failures: config.max_transient_failures,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStopResult {
    pub stopped: bool,
}
