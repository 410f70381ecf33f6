use crate::tracking::notifications::NotificationBuffer;
use crate::tracking::pipeline::TrackerEvent;
use crate::tracking::types::TrackingStatusSnapshot;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Handle to one running tracking session. Cancelling the token tears down
/// the poll timer, countdown tick, push subscription, and any in-flight
/// fetch tasks.
pub struct TrackingSessionHandle {
    pub cancellation_token: CancellationToken,
    pub join_handle: tokio::task::JoinHandle<()>,
    pub refresh_tx: mpsc::Sender<()>,
    pub order_reference: String,
}

/// Process-local tracker state: at most one active session, its status
/// snapshot, the shared notification buffer, and the update broadcast.
pub struct TrackerState {
    pub session: Mutex<Option<TrackingSessionHandle>>,
    pub status: Arc<RwLock<TrackingStatusSnapshot>>,
    pub notifications: Arc<SyncMutex<NotificationBuffer>>,
    pub updates: broadcast::Sender<TrackerEvent>,
}

impl TrackerState {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            session: Mutex::new(None),
            status: Arc::new(RwLock::new(TrackingStatusSnapshot::idle(Some(
                "no active session".to_string(),
            )))),
            notifications: Arc::new(SyncMutex::new(NotificationBuffer::default())),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.updates.subscribe()
    }
}

impl Default for TrackerState {
    fn default() -> Self {
        Self::new()
    }
}
