use crate::error::TrackError;
use crate::state::{TrackerState, TrackingSessionHandle};
use crate::tracking::notifications::{Notification, NotificationBuffer};
use crate::tracking::pipeline::run_tracking_session;
use crate::tracking::types::{
    StartTrackingArgs, TrackingSessionInfo, TrackingStatusSnapshot, TrackingStopResult,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const REFRESH_QUEUE_CAPACITY: usize = 1;

/// Starts tracking an order. Any previous session is cancelled first, so
/// switching orders always tears down the old timers and push subscription
/// before the new ones exist.
pub async fn start_tracking(
    state: &TrackerState,
    args: StartTrackingArgs,
) -> Result<TrackingSessionInfo, TrackError> {
    let config = args.normalize()?;

    let existing_handle = {
        let mut session_slot = state.session.lock().await;
        session_slot.take()
    };
    if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
    }

    // Notifications are scoped to the tracked order.
    *state.notifications.lock() = NotificationBuffer::default();

    let cancellation_token = CancellationToken::new();
    let task_token = cancellation_token.clone();
    let status_store = Arc::clone(&state.status);
    let notifications = Arc::clone(&state.notifications);
    let updates = state.updates.clone();
    let (refresh_tx, refresh_rx) = mpsc::channel(REFRESH_QUEUE_CAPACITY);
    let order_reference = config.order_ref.reference().to_string();
    let session_info = TrackingSessionInfo::from_config(&config);

    let join_handle = tokio::spawn(async move {
        run_tracking_session(
            config,
            status_store,
            notifications,
            updates,
            refresh_rx,
            task_token,
        )
        .await;
    });

    {
        let mut session_slot = state.session.lock().await;
        *session_slot = Some(TrackingSessionHandle {
            cancellation_token,
            join_handle,
            refresh_tx,
            order_reference,
        });
    }

    Ok(session_info)
}

pub async fn stop_tracking(state: &TrackerState) -> Result<TrackingStopResult, TrackError> {
    let existing_handle = {
        let mut session_slot = state.session.lock().await;
        session_slot.take()
    };

    let stopped = if let Some(handle) = existing_handle {
        handle.cancellation_token.cancel();
        let _ = handle.join_handle.await;
        true
    } else {
        false
    };

    Ok(TrackingStopResult { stopped })
}

pub async fn tracking_status(state: &TrackerState) -> TrackingStatusSnapshot {
    state.status.read().await.clone()
}

/// Manual refresh: an immediate out-of-band fetch that leaves the scheduler's
/// autonomous behavior untouched. Returns whether a session was there to ask.
pub async fn refresh_order(state: &TrackerState) -> Result<bool, TrackError> {
    let session_slot = state.session.lock().await;
    match session_slot.as_ref() {
        Some(handle) => {
            // A full refresh queue means one is already pending; that is
            // equivalent to having asked.
            let _ = handle.refresh_tx.try_send(());
            Ok(true)
        }
        None => Ok(false),
    }
}

pub fn active_notifications(state: &TrackerState) -> Vec<Notification> {
    state.notifications.lock().active()
}

pub fn dismiss_notification(state: &TrackerState, id: &str) -> bool {
    state.notifications.lock().dismiss(id)
}
