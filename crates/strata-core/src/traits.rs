//! Collaborator seams for the due-date scheduler.
//!
//! The scheduler never talks to a database or a delivery channel directly;
//! it goes through these traits so storage and transport can be swapped.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{DueNotification, DueThreshold, TrackedItem};

/// Supplies tracked items and resolves their owning project.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// All items currently in the active lifecycle state.
    async fn active_items(&self) -> Result<Vec<TrackedItem>>;

    /// Responsible parties of a project. `None` when the project does not exist.
    async fn responsible_parties(&self, project_id: &str) -> Result<Option<Vec<String>>>;
}

/// Accepts a due-date notification for persistence and/or delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Accept the notification. Once this returns `Ok`, the threshold counts as notified.
    async fn deliver(&self, notification: &DueNotification) -> Result<()>;

    /// Retry hand-offs that were deferred after an accepted delivery.
    /// Returns how many are still outstanding.
    async fn retry_pending(&self) -> usize {
        0
    }
}

/// One fired (item, due day, threshold) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub item_id: String,
    pub due_on: NaiveDate,
    pub threshold: DueThreshold,
}

/// Durable backing for the dedup ledger.
pub trait LedgerStore: Send + Sync {
    fn load(&self) -> Result<Vec<LedgerRecord>>;

    /// Insert the record if absent. Returns `false` when another writer already claimed it.
    /// Records for the same item under a different due day are discarded.
    fn claim(&self, record: &LedgerRecord) -> Result<bool>;

    /// Undo a claim whose delivery failed, so the threshold can be retried.
    fn release(&self, record: &LedgerRecord) -> Result<()>;

    /// Drop every record for an item.
    fn evict(&self, item_id: &str) -> Result<()>;
}
