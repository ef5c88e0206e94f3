//! Scheduler engine: the due-date pass and the loop that drives it.
//! Uses tokio::interval for ticking; one pass at a time per scheduler instance.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use strata_core::traits::{LedgerRecord, LedgerStore, NotificationSink, RecordSource};
use strata_core::{Result, TrackedItem};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::evaluator::{self, ResolvedItem};
use crate::gate::{self, GateDecision};
use crate::ledger::DedupLedger;
use crate::notify::{Delivered, NotifyRouter};

const DEFAULT_MAX_CONCURRENT_DISPATCH: usize = 4;

/// Whether a pass is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SchedulerState {
    Idle,
    Running,
}

/// Counters for one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// Items returned by the record source.
    pub items_seen: usize,
    /// Active, dated, resolved items that reached the gate.
    pub evaluated: usize,
    pub notified: usize,
    /// Deliveries that failed; their thresholds stay open for the next tick.
    pub failed: usize,
    /// Active dated items skipped because their project had no responsible parties.
    pub unresolved: usize,
    /// Thresholds another scheduler sharing the ledger store fired first.
    pub claimed_elsewhere: usize,
    /// Ledger entries dropped because the item is no longer active.
    pub evicted: usize,
    /// Secondary-sink hand-offs still queued after this pass retried them.
    pub deferred: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another pass held the ledger; this one did nothing.
    Skipped,
}

enum Delivery {
    Delivered,
    ClaimedElsewhere,
    Failed(String),
}

/// Flips the running flag back when a pass ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Periodically turns due dates into deduplicated notifications.
pub struct DueDateScheduler {
    source: Arc<dyn RecordSource>,
    sink: Arc<dyn NotificationSink>,
    store: Option<Arc<dyn LedgerStore>>,
    /// Held for the whole pass; doubles as the non-overlap guard.
    ledger: Mutex<DedupLedger>,
    router: Mutex<NotifyRouter>,
    running: AtomicBool,
    max_concurrent: usize,
}

impl DueDateScheduler {
    /// Create a scheduler with an empty in-memory ledger.
    pub fn new(source: Arc<dyn RecordSource>, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            source,
            sink,
            store: None,
            ledger: Mutex::new(DedupLedger::new()),
            router: Mutex::new(NotifyRouter::new()),
            running: AtomicBool::new(false),
            max_concurrent: DEFAULT_MAX_CONCURRENT_DISPATCH,
        }
    }

    /// Cap on concurrent deliveries within one pass (minimum 1).
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Back the ledger with a durable store and hydrate it from what the store already holds.
    pub fn with_ledger_store(mut self, store: Arc<dyn LedgerStore>) -> Result<Self> {
        let records = store.load()?;
        tracing::info!("📒 Loaded {} ledger record(s)", records.len());
        self.ledger = Mutex::new(DedupLedger::from_records(records));
        self.store = Some(store);
        Ok(self)
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::SeqCst) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Number of items with ledger entries. Waits for an in-flight pass.
    pub async fn ledger_len(&self) -> usize {
        self.ledger.lock().await.len()
    }

    /// Most recent deliveries, newest first.
    pub async fn recent_notifications(&self, limit: usize) -> Vec<Delivered> {
        let router = self.router.lock().await;
        let mut recent: Vec<Delivered> = router.history().cloned().collect();
        recent.reverse();
        recent.truncate(limit);
        recent
    }

    /// Run one evaluation pass at `now`.
    ///
    /// Returns `Skipped` if another pass is in flight and `Err` only when the
    /// record source cannot list items; per-item problems are logged and counted.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassOutcome> {
        let Ok(mut ledger) = self.ledger.try_lock() else {
            tracing::debug!("⏭️ Due-date pass already running, skipping");
            return Ok(PassOutcome::Skipped);
        };
        let _running = RunningGuard::enter(&self.running);
        let report = self.pass(now, &mut ledger).await?;
        Ok(PassOutcome::Completed(report))
    }

    async fn pass(&self, now: DateTime<Utc>, ledger: &mut DedupLedger) -> Result<PassReport> {
        let deferred = self.sink.retry_pending().await;
        let items = self.source.active_items().await?;
        let mut report = PassReport {
            items_seen: items.len(),
            deferred,
            ..Default::default()
        };

        let evicted = {
            let active_ids: HashSet<&str> = items
                .iter()
                .filter(|i| i.is_active())
                .map(|i| i.id.as_str())
                .collect();
            ledger.retain_active(&active_ids)
        };
        report.evicted = evicted.len();
        if let Some(store) = &self.store {
            for id in &evicted {
                if let Err(e) = store.evict(id) {
                    tracing::warn!("⚠️ Failed to evict ledger records for {id}: {e}");
                }
            }
        }

        let candidates: Vec<TrackedItem> = items
            .into_iter()
            .filter(|i| i.is_active() && i.due_date.is_some())
            .collect();
        let parties = self.resolve_parties(&candidates).await;

        let mut resolved = Vec::with_capacity(candidates.len());
        for item in candidates {
            match parties.get(&item.project_id) {
                Some(recipients) => resolved.push(ResolvedItem {
                    recipients: recipients.clone(),
                    item,
                }),
                None => report.unresolved += 1,
            }
        }

        let decisions: Vec<GateDecision> = evaluator::due_offsets(now, &resolved)
            .inspect(|_| report.evaluated += 1)
            .filter_map(|(r, offset)| gate::decide(r, offset, &*ledger))
            .collect();

        let deliveries: Vec<(GateDecision, Delivery)> = futures::stream::iter(decisions)
            .map(|decision| async move {
                let delivery = self.deliver(&decision).await;
                (decision, delivery)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut router = self.router.lock().await;
        for (decision, delivery) in deliveries {
            match delivery {
                Delivery::Delivered => {
                    ledger.record(&decision.item_id, decision.due_on, decision.threshold);
                    tracing::info!(
                        "🔔 {} [{}] → {} recipient(s)",
                        decision.item_id,
                        decision.threshold,
                        decision.notification.recipients.len()
                    );
                    router.record(decision.notification, decision.threshold);
                    report.notified += 1;
                }
                Delivery::ClaimedElsewhere => {
                    ledger.record(&decision.item_id, decision.due_on, decision.threshold);
                    report.claimed_elsewhere += 1;
                }
                Delivery::Failed(reason) => {
                    tracing::warn!(
                        "⚠️ Notification for {} [{}] failed, will retry: {reason}",
                        decision.item_id,
                        decision.threshold
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Resolve each distinct project once. Missing, empty, or erroring projects are left out.
    async fn resolve_parties(&self, items: &[TrackedItem]) -> HashMap<String, Vec<String>> {
        let mut resolved = HashMap::new();
        let mut seen = HashSet::new();
        for item in items {
            if !seen.insert(item.project_id.as_str()) {
                continue;
            }
            match self.source.responsible_parties(&item.project_id).await {
                Ok(Some(parties)) if !parties.is_empty() => {
                    resolved.insert(item.project_id.clone(), parties);
                }
                Ok(Some(_)) => {
                    tracing::debug!("Project {} has no responsible parties", item.project_id);
                }
                Ok(None) => {
                    tracing::debug!("Project {} not found, skipping its items", item.project_id);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to resolve project {}: {e}", item.project_id);
                }
            }
        }
        resolved
    }

    async fn deliver(&self, decision: &GateDecision) -> Delivery {
        let record = LedgerRecord {
            item_id: decision.item_id.clone(),
            due_on: decision.due_on,
            threshold: decision.threshold,
        };

        if let Some(store) = &self.store {
            match store.claim(&record) {
                Ok(true) => {}
                Ok(false) => return Delivery::ClaimedElsewhere,
                Err(e) => return Delivery::Failed(format!("ledger claim: {e}")),
            }
        }

        match self.sink.deliver(&decision.notification).await {
            Ok(()) => Delivery::Delivered,
            Err(e) => {
                if let Some(store) = &self.store
                    && let Err(release_err) = store.release(&record)
                {
                    tracing::warn!("⚠️ Failed to release ledger claim for {}: {release_err}", record.item_id);
                }
                Delivery::Failed(e.to_string())
            }
        }
    }

    /// One scheduled tick: run a pass and log the outcome. Never fails.
    pub async fn tick(&self, now: DateTime<Utc>) {
        match self.run_pass(now).await {
            Ok(PassOutcome::Completed(report)) => {
                if report.notified > 0 || report.failed > 0 || report.deferred > 0 {
                    tracing::info!(
                        "📣 Due-date pass: {} notified, {} failed, {} evaluated, {} hand-off(s) queued",
                        report.notified,
                        report.failed,
                        report.evaluated,
                        report.deferred
                    );
                } else {
                    tracing::debug!("Due-date pass: nothing to notify ({} evaluated)", report.evaluated);
                }
            }
            Ok(PassOutcome::Skipped) => {}
            Err(e) => tracing::warn!("⚠️ Due-date pass aborted: {e}"),
        }
    }

    /// Start the loop: a pass right away, then every `interval_minutes` (minimum 1).
    pub fn start(self: &Arc<Self>, interval_minutes: u64) -> SchedulerHandle {
        self.start_with_period(Duration::from_secs(interval_minutes.max(1) * 60))
    }

    /// Start the loop with an arbitrary period.
    pub fn start_with_period(self: &Arc<Self>, period: Duration) -> SchedulerHandle {
        let period = period.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);

        let join = tokio::spawn(async move {
            tracing::info!("⏰ Due-date scheduler started (every {}s)", period.as_secs());
            let mut interval = tokio::time::interval(period);
            // Ticks that land mid-pass are dropped, not queued.
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => scheduler.tick(Utc::now()).await,
                }
            }
            tracing::info!("🛑 Due-date scheduler stopped");
        });

        SchedulerHandle { shutdown_tx, join }
    }
}

/// Handle to a running scheduler loop. Dropping it also stops the loop.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel the pending timer, let an in-flight pass finish, and wait for the loop to exit.
    pub async fn stop(self) {
        let Self { shutdown_tx, join } = self;
        shutdown_tx.send(true).ok();
        if let Err(e) = join.await {
            tracing::warn!("⚠️ Scheduler task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
