//! Critical path over item dependencies.
//!
//! Day numbers are relative to the project start (day 0). An item with
//! duration `d` starting on day `s` ends on day `s + d`.

use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::error::{Result, StrataError};
use crate::types::TrackedItem;

/// Schedule timing for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleTiming {
    pub item_id: String,
    pub early_start: u32,
    pub early_end: u32,
    pub late_start: u32,
    pub late_end: u32,
    pub total_float: u32,
    pub is_critical: bool,
}

/// Compute early/late dates and float for every item, in topological order.
///
/// Fails on a dependency that is not part of `items`, on a dependency cycle,
/// or when the schedule would run past `u32::MAX` days.
pub fn compute_critical_path(items: &[TrackedItem]) -> Result<Vec<ScheduleTiming>> {
    let index: HashMap<&str, usize> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (item.id.as_str(), i))
        .collect();

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); items.len()];
    let mut in_degree = vec![0usize; items.len()];
    for (i, item) in items.iter().enumerate() {
        for dep in &item.depends_on {
            let &d = index.get(dep.as_str()).ok_or_else(|| {
                StrataError::Planning(format!(
                    "item '{}' depends on unknown item '{dep}'",
                    item.id
                ))
            })?;
            successors[d].push(i);
            in_degree[i] += 1;
        }
    }

    // Kahn's algorithm
    let mut queue: VecDeque<usize> = (0..items.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(items.len());
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &s in &successors[i] {
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                queue.push_back(s);
            }
        }
    }
    if order.len() != items.len() {
        return Err(StrataError::Planning("dependency cycle detected".into()));
    }

    let mut early_start = vec![0u32; items.len()];
    let mut early_end = vec![0u32; items.len()];
    for &i in &order {
        early_end[i] = early_start[i]
            .checked_add(items[i].duration_days)
            .ok_or_else(|| {
                StrataError::Planning(format!(
                    "schedule for item '{}' runs past day {}",
                    items[i].id,
                    u32::MAX
                ))
            })?;
        for &s in &successors[i] {
            early_start[s] = early_start[s].max(early_end[i]);
        }
    }

    let project_end = early_end.iter().copied().max().unwrap_or(0);
    let mut late_end = vec![project_end; items.len()];
    let mut late_start = vec![0u32; items.len()];
    for &i in order.iter().rev() {
        if let Some(min_succ) = successors[i].iter().map(|&s| late_start[s]).min() {
            late_end[i] = min_succ;
        }
        late_start[i] = late_end[i] - items[i].duration_days;
    }

    Ok(order
        .into_iter()
        .map(|i| {
            let total_float = late_start[i] - early_start[i];
            ScheduleTiming {
                item_id: items[i].id.clone(),
                early_start: early_start[i],
                early_end: early_end[i],
                late_start: late_start[i],
                late_end: late_end[i],
                total_float,
                is_critical: total_float == 0,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, duration: u32, deps: &[&str]) -> TrackedItem {
        let mut item = TrackedItem::new("prj-1", id, None);
        item.id = id.to_string();
        item.duration_days = duration;
        item.depends_on = deps.iter().map(|d| d.to_string()).collect();
        item
    }

    fn timing<'a>(timings: &'a [ScheduleTiming], id: &str) -> &'a ScheduleTiming {
        timings.iter().find(|t| t.item_id == id).unwrap()
    }

    #[test]
    fn test_diamond() {
        // a -> b (5) -> d
        // a -> c (2) -> d
        let items = vec![
            node("a", 3, &[]),
            node("b", 5, &["a"]),
            node("c", 2, &["a"]),
            node("d", 1, &["b", "c"]),
        ];
        let timings = compute_critical_path(&items).unwrap();

        let c = timing(&timings, "c");
        assert_eq!((c.early_start, c.early_end), (3, 5));
        assert_eq!((c.late_start, c.late_end), (6, 8));
        assert_eq!(c.total_float, 3);
        assert!(!c.is_critical);

        for id in ["a", "b", "d"] {
            assert!(timing(&timings, id).is_critical, "{id} should be critical");
        }
        assert_eq!(timing(&timings, "d").early_end, 9);
    }

    #[test]
    fn test_independent_items_float_to_longest() {
        let items = vec![node("long", 10, &[]), node("short", 4, &[])];
        let timings = compute_critical_path(&items).unwrap();
        assert_eq!(timing(&timings, "short").total_float, 6);
        assert!(timing(&timings, "long").is_critical);
    }

    #[test]
    fn test_cycle_rejected() {
        let items = vec![node("a", 1, &["b"]), node("b", 1, &["a"])];
        let err = compute_critical_path(&items).unwrap_err();
        assert!(matches!(err, StrataError::Planning(_)));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let items = vec![node("a", 1, &["ghost"])];
        assert!(compute_critical_path(&items).is_err());
    }

    #[test]
    fn test_duration_overflow_rejected() {
        let items = vec![node("a", u32::MAX, &[]), node("b", 1, &["a"])];
        let err = compute_critical_path(&items).unwrap_err();
        assert!(matches!(err, StrataError::Planning(ref m) if m.contains("'b'")));

        // A single huge item still fits.
        let single = compute_critical_path(&[node("a", u32::MAX, &[])]).unwrap();
        assert_eq!(single[0].early_end, u32::MAX);
    }

    #[test]
    fn test_empty() {
        assert!(compute_critical_path(&[]).unwrap().is_empty());
    }
}
