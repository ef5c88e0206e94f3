//! Notification history: what the scheduler delivered recently.
//! Lightweight: an in-memory ring buffer, no queue.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use strata_core::{DueNotification, DueThreshold};

/// Max entries kept in history.
const HISTORY_CAPACITY: usize = 100;

/// Notification priority, derived from how close or late the due date is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotifyPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl NotifyPriority {
    pub fn for_threshold(threshold: DueThreshold) -> Self {
        match threshold {
            DueThreshold::InFourteenDays => Self::Low,
            DueThreshold::InSevenDays => Self::Normal,
            DueThreshold::Tomorrow | DueThreshold::OneDayOverdue => Self::High,
            DueThreshold::SevenDaysOverdue => Self::Urgent,
        }
    }
}

/// A delivered notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivered {
    pub notification: DueNotification,
    pub threshold: DueThreshold,
    pub priority: NotifyPriority,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Ring buffer of recent deliveries.
pub struct NotifyRouter {
    history: VecDeque<Delivered>,
}

impl NotifyRouter {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    /// Record a delivered notification in history.
    pub fn record(&mut self, notification: DueNotification, threshold: DueThreshold) {
        self.history.push_back(Delivered {
            notification,
            threshold,
            priority: NotifyPriority::for_threshold(threshold),
            timestamp: chrono::Utc::now(),
        });
        if self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Delivered> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl Default for NotifyRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::NotificationCategory;

    fn sample(id: usize) -> DueNotification {
        DueNotification {
            recipients: vec!["u1".into()],
            category: NotificationCategory::Overdue,
            title: "Action overdue".into(),
            message: format!("item {id}"),
            related_entity_id: format!("act-{id}"),
            related_entity_type: "action".into(),
        }
    }

    #[test]
    fn test_ring_buffer_caps_history() {
        let mut router = NotifyRouter::new();
        for i in 0..(HISTORY_CAPACITY + 5) {
            router.record(sample(i), DueThreshold::OneDayOverdue);
        }
        assert_eq!(router.len(), HISTORY_CAPACITY);
        assert_eq!(router.history().next().unwrap().notification.message, "item 5");
    }

    #[test]
    fn test_priority_mapping() {
        assert_eq!(NotifyPriority::for_threshold(DueThreshold::SevenDaysOverdue), NotifyPriority::Urgent);
        assert_eq!(NotifyPriority::for_threshold(DueThreshold::InFourteenDays), NotifyPriority::Low);
    }
}
