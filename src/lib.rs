pub mod commands;
pub mod error;
pub mod state;
pub mod tracking;

pub use commands::tracking::{
    active_notifications, dismiss_notification, refresh_order, start_tracking, stop_tracking,
    tracking_status,
};
pub use error::TrackError;
pub use state::TrackerState;
pub use tracking::pipeline::TrackerEvent;
pub use tracking::types::{StartTrackingArgs, TrackingSessionInfo, TrackingStatusSnapshot};
