//! Dedup ledger: remembers which thresholds already fired for each item.
//!
//! An entry is armed for one UTC due day. When an item's due date moves,
//! the entry resets so the new countdown notifies again. Entries for items
//! that leave the active set are evicted after each pass.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::NaiveDate;
use strata_core::DueThreshold;
use strata_core::traits::LedgerRecord;

#[derive(Debug, Clone)]
struct LedgerEntry {
    due_on: NaiveDate,
    fired: BTreeSet<DueThreshold>,
}

/// Outcome of recording a fired threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First threshold for this item, or another threshold on the same due day.
    Inserted,
    /// The due day changed since the last record; earlier thresholds were dropped.
    Reset,
    /// Already recorded, nothing changed.
    AlreadyPresent,
}

/// In-process ledger owned by a single scheduler instance.
#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: HashMap<String, LedgerEntry>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records. If an item shows up with several due days,
    /// the last one wins.
    pub fn from_records(records: impl IntoIterator<Item = LedgerRecord>) -> Self {
        let mut ledger = Self::new();
        for record in records {
            ledger.record(&record.item_id, record.due_on, record.threshold);
        }
        ledger
    }

    /// Whether `threshold` already fired for this item's current due day.
    pub fn is_notified(&self, item_id: &str, due_on: NaiveDate, threshold: DueThreshold) -> bool {
        self.entries
            .get(item_id)
            .is_some_and(|e| e.due_on == due_on && e.fired.contains(&threshold))
    }

    /// Mark `threshold` as fired. Creates the entry on first use.
    pub fn record(&mut self, item_id: &str, due_on: NaiveDate, threshold: DueThreshold) -> RecordOutcome {
        match self.entries.get_mut(item_id) {
            Some(entry) if entry.due_on == due_on => {
                if entry.fired.insert(threshold) {
                    RecordOutcome::Inserted
                } else {
                    RecordOutcome::AlreadyPresent
                }
            }
            Some(entry) => {
                entry.due_on = due_on;
                entry.fired.clear();
                entry.fired.insert(threshold);
                RecordOutcome::Reset
            }
            None => {
                self.entries.insert(
                    item_id.to_string(),
                    LedgerEntry {
                        due_on,
                        fired: BTreeSet::from([threshold]),
                    },
                );
                RecordOutcome::Inserted
            }
        }
    }

    /// Drop entries whose item is not in `active_ids`. Returns the evicted ids.
    pub fn retain_active(&mut self, active_ids: &HashSet<&str>) -> Vec<String> {
        let evicted: Vec<String> = self
            .entries
            .keys()
            .filter(|id| !active_ids.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &evicted {
            self.entries.remove(id);
        }
        evicted
    }

    pub fn remove(&mut self, item_id: &str) -> bool {
        self.entries.remove(item_id).is_some()
    }

    /// Thresholds fired for an item, in enum order.
    pub fn fired(&self, item_id: &str) -> Vec<DueThreshold> {
        self.entries
            .get(item_id)
            .map(|e| e.fired.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn records(&self) -> Vec<LedgerRecord> {
        self.entries
            .iter()
            .flat_map(|(id, entry)| {
                entry.fired.iter().map(move |t| LedgerRecord {
                    item_id: id.clone(),
                    due_on: entry.due_on,
                    threshold: *t,
                })
            })
            .collect()
    }

    /// Number of items tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut ledger = DedupLedger::new();
        assert!(!ledger.is_notified("a", day(10), DueThreshold::InSevenDays));
        assert_eq!(ledger.record("a", day(10), DueThreshold::InSevenDays), RecordOutcome::Inserted);
        assert_eq!(
            ledger.record("a", day(10), DueThreshold::InSevenDays),
            RecordOutcome::AlreadyPresent
        );
        assert!(ledger.is_notified("a", day(10), DueThreshold::InSevenDays));
        assert!(!ledger.is_notified("a", day(10), DueThreshold::Tomorrow));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_due_date_edit_rearms() {
        let mut ledger = DedupLedger::new();
        ledger.record("a", day(10), DueThreshold::InSevenDays);
        ledger.record("a", day(10), DueThreshold::Tomorrow);

        // Pushed out by a week: the old fired set no longer suppresses anything.
        assert!(!ledger.is_notified("a", day(17), DueThreshold::InSevenDays));
        assert_eq!(ledger.record("a", day(17), DueThreshold::InSevenDays), RecordOutcome::Reset);
        assert_eq!(ledger.fired("a"), vec![DueThreshold::InSevenDays]);
    }

    #[test]
    fn test_retain_active_evicts_others() {
        let mut ledger = DedupLedger::new();
        ledger.record("a", day(1), DueThreshold::Tomorrow);
        ledger.record("b", day(1), DueThreshold::Tomorrow);
        ledger.record("c", day(1), DueThreshold::OneDayOverdue);

        let active: HashSet<&str> = ["b"].into_iter().collect();
        let mut evicted = ledger.retain_active(&active);
        evicted.sort();
        assert_eq!(evicted, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_notified("b", day(1), DueThreshold::Tomorrow));
    }

    #[test]
    fn test_from_records_rebuilds() {
        let records = vec![
            LedgerRecord { item_id: "a".into(), due_on: day(5), threshold: DueThreshold::InFourteenDays },
            LedgerRecord { item_id: "a".into(), due_on: day(5), threshold: DueThreshold::InSevenDays },
            LedgerRecord { item_id: "b".into(), due_on: day(9), threshold: DueThreshold::Tomorrow },
        ];
        let ledger = DedupLedger::from_records(records);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.records().len(), 3);
        assert!(ledger.is_notified("a", day(5), DueThreshold::InFourteenDays));
    }
}
