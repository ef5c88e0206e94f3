//! Progress roll-up for a set of tracked items.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{LifecycleState, TrackedItem};

/// Aggregate progress of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub achieved: usize,
    pub archived: usize,
    /// Active items whose due day is already behind `now`.
    pub overdue: usize,
    /// Mean percent complete over non-archived items (0.0 when there are none).
    pub percent_complete: f64,
}

/// Roll up item states. Finished items count as 100%, archived items are left out of the mean.
pub fn rollup(items: &[TrackedItem], now: DateTime<Utc>) -> ProgressSummary {
    let mut summary = ProgressSummary {
        total: items.len(),
        ..Default::default()
    };
    let mut weighted = 0u64;
    let mut counted = 0u64;

    for item in items {
        match item.state {
            LifecycleState::Active => {
                summary.active += 1;
                if item
                    .due_date
                    .is_some_and(|due| due.date_naive() < now.date_naive())
                {
                    summary.overdue += 1;
                }
            }
            LifecycleState::Completed => summary.completed += 1,
            LifecycleState::Achieved => summary.achieved += 1,
            LifecycleState::Archived => {
                summary.archived += 1;
                continue;
            }
        }
        counted += 1;
        weighted += if item.state.is_done() {
            100
        } else {
            u64::from(item.progress.min(100))
        };
    }

    if counted > 0 {
        summary.percent_complete = weighted as f64 / counted as f64;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(state: LifecycleState, progress: u8, due_in_days: Option<i64>) -> TrackedItem {
        let now = Utc::now();
        let mut item = TrackedItem::new("prj-1", "x", due_in_days.map(|d| now + Duration::days(d)));
        item.state = state;
        item.progress = progress;
        item
    }

    #[test]
    fn test_rollup_mixed_states() {
        let items = vec![
            item(LifecycleState::Active, 50, Some(3)),
            item(LifecycleState::Active, 0, Some(-2)),
            item(LifecycleState::Completed, 10, None),
            item(LifecycleState::Archived, 0, Some(-30)),
        ];
        let summary = rollup(&items, Utc::now());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.active, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.archived, 1);
        assert_eq!(summary.overdue, 1);
        assert!((summary.percent_complete - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rollup_empty() {
        let summary = rollup(&[], Utc::now());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.percent_complete, 0.0);
    }
}
