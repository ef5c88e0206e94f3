//! SQLite-backed persistence for projects, tracked items, notifications, and the dedup ledger.
//! Doubles as the scheduler's record source, notification sink, and ledger store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use strata_core::traits::{LedgerRecord, LedgerStore, NotificationSink, RecordSource};
use strata_core::{
    DueNotification, DueThreshold, LifecycleState, NotificationCategory, Project, Result,
    StrataError, TrackedItem,
};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Shared SELECT column list for item queries.
const ITEM_SELECT: &str = "SELECT id, project_id, title, due_date, state, progress, duration_days, depends_on, created_at, updated_at FROM items";

/// A notification row as stored for one recipient.
#[derive(Debug, Clone, Serialize)]
pub struct StoredNotification {
    pub id: i64,
    pub recipient: String,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub related_entity_id: String,
    pub related_entity_type: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// SQLite persistence store for all scheduler data.
pub struct SchedulerDb {
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> StrataError + '_ {
    move |e| StrataError::Database(format!("{context}: {e}"))
}

/// A text column that does not decode into its domain type.
fn bad_column<E>(idx: usize) -> impl FnOnce(E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn ts_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(bad_column(idx))
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    let parties: String = row.get(2)?;
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        responsible_parties: serde_json::from_str(&parties).map_err(bad_column(2))?,
        created_at: ts_column(row, 3)?,
    })
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<TrackedItem> {
    let due_date = match row.get::<_, Option<String>>(3)? {
        Some(_) => Some(ts_column(row, 3)?),
        None => None,
    };
    let state: String = row.get(4)?;
    let depends_on: String = row.get(7)?;
    Ok(TrackedItem {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        due_date,
        state: state.parse::<LifecycleState>().map_err(bad_column(4))?,
        progress: row.get(5)?,
        duration_days: row.get(6)?,
        depends_on: serde_json::from_str(&depends_on).map_err(bad_column(7))?,
        created_at: ts_column(row, 8)?,
        updated_at: ts_column(row, 9)?,
    })
}

impl SchedulerDb {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err("DB open"))?;

        // WAL lets the CLI read while `serve` is writing
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(db_err("DB pragma"))?;

        let db = Self { conn: Mutex::new(conn) };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StrataError::Database(format!("DB lock poisoned: {e}")))
    }

    /// Run migrations to create tables.
    fn migrate(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                responsible_parties TEXT NOT NULL DEFAULT '[]',  -- JSON array
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                title TEXT NOT NULL,
                due_date TEXT,
                state TEXT NOT NULL DEFAULT 'active',
                progress INTEGER NOT NULL DEFAULT 0,
                duration_days INTEGER NOT NULL DEFAULT 1,
                depends_on TEXT NOT NULL DEFAULT '[]',           -- JSON array of item ids
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_items_state ON items(state);
            CREATE INDEX IF NOT EXISTS idx_items_project ON items(project_id);

            -- One row per recipient
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient TEXT NOT NULL,
                category TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                related_entity_id TEXT NOT NULL,
                related_entity_type TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_recipient ON notifications(recipient, read);

            -- Fired thresholds; the primary key makes claims atomic
            CREATE TABLE IF NOT EXISTS due_ledger (
                item_id TEXT NOT NULL,
                due_on TEXT NOT NULL,
                threshold INTEGER NOT NULL,
                claimed_at TEXT NOT NULL,
                PRIMARY KEY (item_id, due_on, threshold)
            );
         ",
            )
            .map_err(db_err("Migration"))?;
        Ok(())
    }

    // ─── Projects ──────────────────────────────────────

    pub fn insert_project(&self, project: &Project) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO projects (id, name, responsible_parties, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    project.id,
                    project.name,
                    serde_json::to_string(&project.responsible_parties)?,
                    project.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Insert project"))?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        self.conn()?
            .query_row(
                "SELECT id, name, responsible_parties, created_at FROM projects WHERE id = ?1",
                [id],
                row_to_project,
            )
            .optional()
            .map_err(db_err("Get project"))
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, responsible_parties, created_at FROM projects ORDER BY created_at")
            .map_err(db_err("List projects"))?;
        let rows = stmt
            .query_map([], row_to_project)
            .map_err(db_err("List projects"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("List projects"))
    }

    // ─── Items ──────────────────────────────────────

    pub fn insert_item(&self, item: &TrackedItem) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO items (id, project_id, title, due_date, state, progress, duration_days, depends_on, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    item.id,
                    item.project_id,
                    item.title,
                    item.due_date.map(|d| d.to_rfc3339()),
                    item.state.as_str(),
                    item.progress,
                    item.duration_days,
                    serde_json::to_string(&item.depends_on)?,
                    item.created_at.to_rfc3339(),
                    item.updated_at.to_rfc3339(),
                ],
            )
            .map_err(db_err("Insert item"))?;
        Ok(())
    }

    pub fn get_item(&self, id: &str) -> Result<Option<TrackedItem>> {
        self.conn()?
            .query_row(&format!("{ITEM_SELECT} WHERE id = ?1"), [id], row_to_item)
            .optional()
            .map_err(db_err("Get item"))
    }

    /// Items of one project, or all items when `project_id` is `None`.
    pub fn list_items(&self, project_id: Option<&str>) -> Result<Vec<TrackedItem>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "{ITEM_SELECT} WHERE (?1 IS NULL OR project_id = ?1) ORDER BY created_at"
            ))
            .map_err(db_err("List items"))?;
        let rows = stmt
            .query_map([project_id], row_to_item)
            .and_then(|r| r.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(db_err("List items"))?;
        Ok(rows)
    }

    /// Active items for the scheduler. Rows that fail to decode are logged and skipped
    /// so one bad record cannot stall every other item.
    fn list_active_items(&self) -> Result<Vec<TrackedItem>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!("{ITEM_SELECT} WHERE state = 'active' ORDER BY created_at"))
            .map_err(db_err("Active items"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row_to_item(row))))
            .map_err(db_err("Active items"))?;

        let mut items = Vec::new();
        for row in rows {
            match row.map_err(db_err("Active items"))? {
                (_, Ok(item)) => items.push(item),
                (
                    id,
                    Err(
                        e @ (rusqlite::Error::FromSqlConversionFailure(..)
                        | rusqlite::Error::IntegralValueOutOfRange(..)),
                    ),
                ) => {
                    tracing::warn!("⚠️ Skipping corrupt item row {id}: {e}");
                }
                (_, Err(e)) => return Err(db_err("Active items")(e)),
            }
        }
        Ok(items)
    }

    fn update_item(&self, id: &str, column_sql: &str, value: &dyn rusqlite::ToSql) -> Result<()> {
        let changed = self
            .conn()?
            .execute(
                &format!("UPDATE items SET {column_sql} = ?1, updated_at = ?2 WHERE id = ?3"),
                params![value, Utc::now().to_rfc3339(), id],
            )
            .map_err(db_err("Update item"))?;
        if changed == 0 {
            return Err(StrataError::NotFound(format!("item '{id}'")));
        }
        Ok(())
    }

    pub fn set_item_state(&self, id: &str, state: LifecycleState) -> Result<()> {
        self.update_item(id, "state", &state.as_str())
    }

    pub fn set_item_due(&self, id: &str, due_date: Option<DateTime<Utc>>) -> Result<()> {
        self.update_item(id, "due_date", &due_date.map(|d| d.to_rfc3339()))
    }

    pub fn set_item_progress(&self, id: &str, progress: u8) -> Result<()> {
        if progress > 100 {
            return Err(StrataError::InvalidInput(format!("progress {progress} is above 100")));
        }
        self.update_item(id, "progress", &progress)
    }

    // ─── Notifications ──────────────────────────────────────

    /// Store one row per recipient, atomically.
    pub fn save_notification(&self, notification: &DueNotification) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("Save notification"))?;
        let now = Utc::now().to_rfc3339();
        for recipient in &notification.recipients {
            tx.execute(
                "INSERT INTO notifications (recipient, category, title, message, related_entity_id, related_entity_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    recipient,
                    notification.category.as_str(),
                    notification.title,
                    notification.message,
                    notification.related_entity_id,
                    notification.related_entity_type,
                    now,
                ],
            )
            .map_err(db_err("Save notification"))?;
        }
        tx.commit().map_err(db_err("Save notification"))?;
        Ok(notification.recipients.len())
    }

    /// Newest first. `recipient = None` lists everyone's notifications.
    pub fn list_notifications(
        &self,
        recipient: Option<&str>,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<StoredNotification>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, recipient, category, title, message, related_entity_id, related_entity_type, read, created_at
                 FROM notifications
                 WHERE (?1 IS NULL OR recipient = ?1) AND (?2 = 0 OR read = 0)
                 ORDER BY id DESC LIMIT ?3",
            )
            .map_err(db_err("List notifications"))?;
        let rows = stmt
            .query_map(params![recipient, unread_only as i32, limit as i64], |row| {
                let category: String = row.get(2)?;
                Ok(StoredNotification {
                    id: row.get(0)?,
                    recipient: row.get(1)?,
                    category: category.parse::<NotificationCategory>().map_err(bad_column(2))?,
                    title: row.get(3)?,
                    message: row.get(4)?,
                    related_entity_id: row.get(5)?,
                    related_entity_type: row.get(6)?,
                    read: row.get::<_, i32>(7)? != 0,
                    created_at: ts_column(row, 8)?,
                })
            })
            .and_then(|r| r.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(db_err("List notifications"))?;
        Ok(rows)
    }

    pub fn mark_notification_read(&self, id: i64) -> Result<()> {
        let changed = self
            .conn()?
            .execute("UPDATE notifications SET read = 1 WHERE id = ?1", [id])
            .map_err(db_err("Mark read"))?;
        if changed == 0 {
            return Err(StrataError::NotFound(format!("notification {id}")));
        }
        Ok(())
    }

    // ─── Ledger ──────────────────────────────────────

    fn load_ledger(&self) -> Result<Vec<LedgerRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT item_id, due_on, threshold FROM due_ledger ORDER BY claimed_at")
            .map_err(db_err("Load ledger"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })
            .and_then(|r| r.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(db_err("Load ledger"))?;

        Ok(rows
            .into_iter()
            .filter_map(|(item_id, due_on, offset)| {
                let due_on = NaiveDate::parse_from_str(&due_on, DAY_FORMAT).ok()?;
                let threshold = DueThreshold::from_offset(offset)?;
                Some(LedgerRecord { item_id, due_on, threshold })
            })
            .collect())
    }

    fn claim_ledger(&self, record: &LedgerRecord) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err("Claim ledger"))?;
        let due_on = record.due_on.format(DAY_FORMAT).to_string();
        // An item has one due day at a time; older days are stale after an edit.
        tx.execute(
            "DELETE FROM due_ledger WHERE item_id = ?1 AND due_on != ?2",
            params![record.item_id, due_on],
        )
        .map_err(db_err("Claim ledger"))?;
        let inserted = tx
            .execute(
                "INSERT OR IGNORE INTO due_ledger (item_id, due_on, threshold, claimed_at) VALUES (?1, ?2, ?3, ?4)",
                params![record.item_id, due_on, record.threshold.offset(), Utc::now().to_rfc3339()],
            )
            .map_err(db_err("Claim ledger"))?;
        tx.commit().map_err(db_err("Claim ledger"))?;
        Ok(inserted == 1)
    }

    fn release_ledger(&self, record: &LedgerRecord) -> Result<()> {
        self.conn()?
            .execute(
                "DELETE FROM due_ledger WHERE item_id = ?1 AND due_on = ?2 AND threshold = ?3",
                params![
                    record.item_id,
                    record.due_on.format(DAY_FORMAT).to_string(),
                    record.threshold.offset()
                ],
            )
            .map_err(db_err("Release ledger"))?;
        Ok(())
    }

    fn evict_ledger(&self, item_id: &str) -> Result<()> {
        self.conn()?
            .execute("DELETE FROM due_ledger WHERE item_id = ?1", [item_id])
            .map_err(db_err("Evict ledger"))?;
        Ok(())
    }
}

#[async_trait]
impl RecordSource for SchedulerDb {
    async fn active_items(&self) -> Result<Vec<TrackedItem>> {
        self.list_active_items()
    }

    async fn responsible_parties(&self, project_id: &str) -> Result<Option<Vec<String>>> {
        Ok(self.get_project(project_id)?.map(|p| p.responsible_parties))
    }
}

#[async_trait]
impl NotificationSink for SchedulerDb {
    fn name(&self) -> &str {
        "database"
    }

    async fn deliver(&self, notification: &DueNotification) -> Result<()> {
        let rows = self.save_notification(notification)?;
        tracing::debug!("💾 Stored {} notification row(s) for {}", rows, notification.related_entity_id);
        Ok(())
    }
}

impl LedgerStore for SchedulerDb {
    fn load(&self) -> Result<Vec<LedgerRecord>> {
        self.load_ledger()
    }

    fn claim(&self, record: &LedgerRecord) -> Result<bool> {
        self.claim_ledger(record)
    }

    fn release(&self, record: &LedgerRecord) -> Result<()> {
        self.release_ledger(record)
    }

    fn evict(&self, item_id: &str) -> Result<()> {
        self.evict_ledger(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn temp_db(name: &str) -> (SchedulerDb, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("strata-db-test-{name}-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        let db = SchedulerDb::open(&dir.join("test.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn test_open_and_migrate() {
        let (db, dir) = temp_db("migrate");
        assert!(db.list_projects().unwrap().is_empty());
        assert!(db.list_items(None).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_items_and_record_source() {
        let (db, dir) = temp_db("items");
        let project = Project::new("Growth", vec!["alice".into(), "bob".into()]);
        db.insert_project(&project).unwrap();

        let mut item = TrackedItem::new(&project.id, "Hire lead", Some(Utc::now() + Duration::days(3)));
        item.depends_on = vec!["act-other".into()];
        db.insert_item(&item).unwrap();
        let done = TrackedItem::new(&project.id, "Kickoff", None);
        db.insert_item(&done).unwrap();
        db.set_item_state(&done.id, LifecycleState::Completed).unwrap();

        let active = db.active_items().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, item.id);
        assert_eq!(active[0].depends_on, vec!["act-other".to_string()]);

        let parties = db.responsible_parties(&project.id).await.unwrap();
        assert_eq!(parties, Some(vec!["alice".to_string(), "bob".to_string()]));
        assert_eq!(db.responsible_parties("prj-missing").await.unwrap(), None);

        assert!(matches!(
            db.set_item_state("act-missing", LifecycleState::Archived),
            Err(StrataError::NotFound(_))
        ));
        assert!(db.set_item_progress(&item.id, 101).is_err());
        db.set_item_progress(&item.id, 40).unwrap();
        db.set_item_due(&item.id, None).unwrap();
        let reloaded = db.get_item(&item.id).unwrap().unwrap();
        assert_eq!(reloaded.progress, 40);
        assert!(reloaded.due_date.is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_notifications_per_recipient() {
        let (db, dir) = temp_db("notify");
        let n = DueNotification {
            recipients: vec!["alice".into(), "bob".into()],
            category: NotificationCategory::Overdue,
            title: "Action overdue".into(),
            message: "\"Hire lead\" is 1 day overdue".into(),
            related_entity_id: "act-1".into(),
            related_entity_type: "action".into(),
        };
        db.deliver(&n).await.unwrap();

        assert_eq!(db.list_notifications(None, false, 10).unwrap().len(), 2);
        let alice = db.list_notifications(Some("alice"), true, 10).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].category, NotificationCategory::Overdue);

        db.mark_notification_read(alice[0].id).unwrap();
        assert!(db.list_notifications(Some("alice"), true, 10).unwrap().is_empty());
        assert!(db.mark_notification_read(9999).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_corrupt_rows_are_not_rewritten() {
        let (db, dir) = temp_db("corrupt");
        let project = Project::new("Ops", vec!["alice".into()]);
        db.insert_project(&project).unwrap();
        let due = Some(Utc::now() + Duration::days(7));
        let healthy = TrackedItem::new(&project.id, "Healthy", due);
        let bad_due = TrackedItem::new(&project.id, "Bad due date", due);
        let bad_state = TrackedItem::new(&project.id, "Bad state", due);
        for item in [&healthy, &bad_due, &bad_state] {
            db.insert_item(item).unwrap();
        }
        {
            let conn = db.conn().unwrap();
            conn.execute("UPDATE items SET due_date = 'soon' WHERE id = ?1", [&bad_due.id])
                .unwrap();
            conn.execute("UPDATE items SET state = 'archivd' WHERE id = ?1", [&bad_state.id])
                .unwrap();
        }

        // The scheduler still sees the healthy item and nothing else.
        let active = db.active_items().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, healthy.id);

        // Direct reads surface the corruption instead of guessing.
        assert!(matches!(db.get_item(&bad_due.id), Err(StrataError::Database(_))));
        assert!(matches!(db.get_item(&bad_state.id), Err(StrataError::Database(_))));
        assert!(db.list_items(Some(&project.id)).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_ledger_claim_is_exclusive() {
        let (db, dir) = temp_db("ledger");
        let day = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let record = LedgerRecord { item_id: "act-1".into(), due_on: day, threshold: DueThreshold::InSevenDays };

        assert!(db.claim(&record).unwrap());
        assert!(!db.claim(&record).unwrap());
        assert_eq!(db.load().unwrap(), vec![record.clone()]);

        db.release(&record).unwrap();
        assert!(db.claim(&record).unwrap());

        // Claiming under a new due day drops the stale one.
        let moved = LedgerRecord { due_on: day + Duration::days(7), ..record.clone() };
        assert!(db.claim(&moved).unwrap());
        assert_eq!(db.load().unwrap(), vec![moved]);

        db.evict("act-1").unwrap();
        assert!(db.load().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
