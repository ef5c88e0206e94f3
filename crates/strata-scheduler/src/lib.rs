//! # Strata Scheduler
//!
//! Due-date notification scheduler for tracked actions.
//!
//! ## Design Principles
//! - Notify exactly on the threshold days (+14, +7, +1, -1, -7), never in between
//! - At most one notification per (item, due day, threshold)
//! - A failed delivery leaves the threshold open for the next tick
//! - One pass at a time; a slow pass swallows the ticks it overlaps
//!
//! ## Architecture
//! ```text
//! DueDateScheduler (tokio interval)
//!   ├── RecordSource → active items + project responsible parties
//!   ├── evaluator: item → signed UTC day offset
//!   ├── gate: offset + DedupLedger → GateDecision
//!   └── dispatch (bounded concurrency) → NotificationSink
//!                      ├── SchedulerDb (per-recipient rows)
//!                      └── WebhookSink (HTTP POST)
//! ```

pub mod dispatch;
pub mod engine;
pub mod evaluator;
pub mod gate;
pub mod ledger;
pub mod notify;
pub mod persistence;

pub use dispatch::{FanoutSink, WebhookSink, sink_from_config};
pub use engine::{DueDateScheduler, PassOutcome, PassReport, SchedulerHandle, SchedulerState};
pub use ledger::DedupLedger;
pub use notify::{Delivered, NotifyPriority, NotifyRouter};
pub use persistence::{SchedulerDb, StoredNotification};
