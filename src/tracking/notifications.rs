use crate::tracking::types::OrderStatusEvent;
use serde::Serialize;

pub const NOTIFICATION_CAPACITY: usize = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub message: String,
    pub created_at_ms: Option<i64>,
    pub dismissed: bool,
}

impl Notification {
    pub fn from_event(event: &OrderStatusEvent) -> Self {
        Self {
            id: event.id.clone(),
            message: event.message.clone(),
            created_at_ms: event.created_at_ms,
            dismissed: false,
        }
    }
}

/// Bounded, most-recent-first collection of status-change notices. Dismissed
/// entries stay in place for ordering; only eviction past capacity deletes.
#[derive(Debug, Default)]
pub struct NotificationBuffer {
    entries: Vec<Notification>,
}

impl NotificationBuffer {
    /// Idempotent by id: a duplicate is dropped without reordering. Returns
    /// whether the notification was actually inserted.
    pub fn append(&mut self, notification: Notification) -> bool {
        if self.entries.iter().any(|entry| entry.id == notification.id) {
            return false;
        }
        self.entries.insert(0, notification);
        self.entries.truncate(NOTIFICATION_CAPACITY);
        true
    }

    pub fn dismiss(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.dismissed = true;
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Vec<Notification> {
        self.entries
            .iter()
            .filter(|entry| !entry.dismissed)
            .cloned()
            .collect()
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
