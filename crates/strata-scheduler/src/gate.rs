//! Notification gate: decides whether an (item, offset) pair should notify.
//!
//! Only the five exact threshold days notify; every other offset is silent.
//! The gate only reads the ledger. The caller records the threshold after
//! the sink accepted the notification, so failed deliveries retry next tick.

use chrono::NaiveDate;
use strata_core::{DueNotification, DueThreshold, TrackedItem};

use crate::evaluator::ResolvedItem;
use crate::ledger::DedupLedger;

/// Entity type tag attached to due-date notifications.
pub const RELATED_ENTITY_TYPE: &str = "action";

/// A notification that should be sent, plus what to record once it is.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub item_id: String,
    pub due_on: NaiveDate,
    pub threshold: DueThreshold,
    pub notification: DueNotification,
}

/// Map one evaluated item to a decision, or `None` when nothing should fire.
pub fn decide(resolved: &ResolvedItem, offset: i64, ledger: &DedupLedger) -> Option<GateDecision> {
    let threshold = DueThreshold::from_offset(offset)?;
    let due_on = resolved.item.due_date?.date_naive();
    if ledger.is_notified(&resolved.item.id, due_on, threshold) {
        return None;
    }
    Some(GateDecision {
        item_id: resolved.item.id.clone(),
        due_on,
        threshold,
        notification: build_notification(&resolved.item, &resolved.recipients, threshold),
    })
}

/// Build the notification for `threshold`, addressed to every recipient.
pub fn build_notification(
    item: &TrackedItem,
    recipients: &[String],
    threshold: DueThreshold,
) -> DueNotification {
    let title = if threshold.is_overdue() {
        "Action overdue".to_string()
    } else {
        "Action deadline approaching".to_string()
    };
    DueNotification {
        recipients: recipients.to_vec(),
        category: threshold.category(),
        title,
        message: format!("\"{}\" {}", item.title, threshold.phrase()),
        related_entity_id: item.id.clone(),
        related_entity_type: RELATED_ENTITY_TYPE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use strata_core::NotificationCategory;

    fn resolved(due_in: i64) -> ResolvedItem {
        let item = TrackedItem::new("prj-1", "Quarterly review", Some(Utc::now() + Duration::days(due_in)));
        ResolvedItem {
            item,
            recipients: vec!["u1".into(), "u2".into()],
        }
    }

    #[test]
    fn test_fires_only_on_exact_days() {
        let ledger = DedupLedger::new();
        let r = resolved(7);
        for off in [0, 2, 13, 15, -2, -6, -8] {
            assert!(decide(&r, off, &ledger).is_none(), "offset {off} must be silent");
        }
        for off in [14, 7, 1, -1, -7] {
            assert!(decide(&r, off, &ledger).is_some(), "offset {off} must fire");
        }
    }

    #[test]
    fn test_suppressed_once_recorded() {
        let mut ledger = DedupLedger::new();
        let r = resolved(7);
        let decision = decide(&r, 7, &ledger).unwrap();
        ledger.record(&decision.item_id, decision.due_on, decision.threshold);
        assert!(decide(&r, 7, &ledger).is_none());
        // A different threshold on the same item is still open.
        assert!(decide(&r, 1, &ledger).is_some());
    }

    #[test]
    fn test_notification_content() {
        let r = resolved(7);
        let upcoming = decide(&r, 7, &DedupLedger::new()).unwrap().notification;
        assert_eq!(upcoming.recipients, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(upcoming.category, NotificationCategory::DeadlineApproaching);
        assert_eq!(upcoming.message, "\"Quarterly review\" is due in 7 days");
        assert_eq!(upcoming.related_entity_id, r.item.id);
        assert_eq!(upcoming.related_entity_type, "action");

        let tomorrow = build_notification(&r.item, &r.recipients, DueThreshold::Tomorrow);
        assert_eq!(tomorrow.message, "\"Quarterly review\" is due tomorrow");

        let overdue = build_notification(&r.item, &r.recipients, DueThreshold::SevenDaysOverdue);
        assert_eq!(overdue.category, NotificationCategory::Overdue);
        assert_eq!(overdue.title, "Action overdue");
        assert_eq!(overdue.message, "\"Quarterly review\" is 7 days overdue");
    }
}
