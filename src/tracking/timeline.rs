use crate::tracking::types::{OrderStatus, OrderType, StatusHistoryEntry};
use serde::Serialize;

pub const SEQUENCE_LEN: usize = 4;

const COLLECTION_SEQUENCE: [OrderStatus; SEQUENCE_LEN] = [
    OrderStatus::Received,
    OrderStatus::Preparing,
    OrderStatus::Ready,
    OrderStatus::Completed,
];

const DELIVERY_SEQUENCE: [OrderStatus; SEQUENCE_LEN] = [
    OrderStatus::Received,
    OrderStatus::Preparing,
    OrderStatus::OutForDelivery,
    OrderStatus::Completed,
];

pub fn step_sequence(order_type: OrderType) -> &'static [OrderStatus; SEQUENCE_LEN] {
    match order_type {
        OrderType::Collection => &COLLECTION_SEQUENCE,
        OrderType::Delivery => &DELIVERY_SEQUENCE,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStep {
    pub step: OrderStatus,
    pub timestamp_ms: Option<i64>,
    pub is_current: bool,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub steps: Vec<TimelineStep>,
    pub progress_percentage: u8,
    pub cancelled: bool,
}

/// First-match history lookup. Duplicate statuses in the history resolve to
/// the earliest entry; insertion order is chronological.
pub fn first_history_timestamp(
    history: &[StatusHistoryEntry],
    status: OrderStatus,
) -> Option<i64> {
    history
        .iter()
        .find(|entry| entry.status == status)
        .and_then(|entry| entry.changed_at_ms)
}

/// Maps raw status data to the fixed four-step progress view. A cancelled or
/// unrecognized status yields no current step and no completed steps; the
/// `cancelled` flag tells the caller to render the terminal overlay instead.
pub fn derive_timeline(
    status: OrderStatus,
    order_type: OrderType,
    history: &[StatusHistoryEntry],
) -> Timeline {
    let sequence = step_sequence(order_type);
    let cancelled = status == OrderStatus::Cancelled;
    let current_index = if cancelled {
        None
    } else {
        sequence.iter().position(|step| *step == status)
    };

    let steps = sequence
        .iter()
        .enumerate()
        .map(|(index, step)| TimelineStep {
            step: *step,
            timestamp_ms: first_history_timestamp(history, *step),
            is_current: current_index == Some(index),
            is_completed: current_index.is_some_and(|current| index <= current),
        })
        .collect();

    Timeline {
        steps,
        progress_percentage: progress_percentage(current_index),
        cancelled,
    }
}

fn progress_percentage(current_index: Option<usize>) -> u8 {
    match current_index {
        // round((i + 1) / SEQUENCE_LEN * 100), in integer arithmetic
        Some(index) => {
            (((index + 1) * 200 + SEQUENCE_LEN) / (2 * SEQUENCE_LEN)) as u8
        }
        None => 0,
    }
}
