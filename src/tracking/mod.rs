pub mod api;
pub mod countdown;
pub mod notifications;
pub mod pipeline;
pub mod timeline;
pub mod types;
