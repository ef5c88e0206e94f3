//! Due-date evaluator: turns items into signed day offsets.
//! Pure: reads items and a clock value, never touches the ledger.

use chrono::{DateTime, Utc};
use strata_core::TrackedItem;

/// An item paired with the responsible parties of its project.
#[derive(Debug, Clone)]
pub struct ResolvedItem {
    pub item: TrackedItem,
    pub recipients: Vec<String>,
}

/// Whole UTC days from `now` to `due`. Both sides are truncated to UTC midnight,
/// so a negative value means overdue regardless of the time of day.
pub fn day_offset(due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (due.date_naive() - now.date_naive()).num_days()
}

/// Lazily yield `(item, offset)` for every active item with a due date and at least one recipient.
pub fn due_offsets<'a>(
    now: DateTime<Utc>,
    items: &'a [ResolvedItem],
) -> impl Iterator<Item = (&'a ResolvedItem, i64)> + 'a {
    items.iter().filter_map(move |resolved| {
        if !resolved.item.is_active() || resolved.recipients.is_empty() {
            return None;
        }
        let due = resolved.item.due_date?;
        Some((resolved, day_offset(due, now)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use strata_core::LifecycleState;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn resolved(due: Option<DateTime<Utc>>, state: LifecycleState, recipients: &[&str]) -> ResolvedItem {
        let mut item = TrackedItem::new("prj-1", "Ship report", due);
        item.state = state;
        ResolvedItem {
            item,
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_offset_ignores_time_of_day() {
        // Late evening now, early morning due date one calendar day later.
        assert_eq!(day_offset(at(2026, 3, 2, 1), at(2026, 3, 1, 23)), 1);
        assert_eq!(day_offset(at(2026, 3, 1, 0), at(2026, 3, 1, 23)), 0);
        assert_eq!(day_offset(at(2026, 2, 22, 12), at(2026, 3, 1, 8)), -7);
    }

    #[test]
    fn test_offset_crosses_month_boundary() {
        assert_eq!(day_offset(at(2026, 3, 15, 9), at(2026, 3, 1, 9)), 14);
    }

    #[test]
    fn test_filters_inactive_undated_and_unowned() {
        let now = at(2026, 5, 10, 12);
        let items = vec![
            resolved(Some(now + Duration::days(7)), LifecycleState::Active, &["u1"]),
            resolved(Some(now - Duration::days(1)), LifecycleState::Completed, &["u1"]),
            resolved(None, LifecycleState::Active, &["u1"]),
            resolved(Some(now + Duration::days(1)), LifecycleState::Active, &[]),
            resolved(Some(now - Duration::days(7)), LifecycleState::Archived, &["u2"]),
        ];
        let offsets: Vec<i64> = due_offsets(now, &items).map(|(_, off)| off).collect();
        assert_eq!(offsets, vec![7]);
    }
}
