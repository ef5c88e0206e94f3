//! Domain records for projects, tracked actions and due-date notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StrataError;

/// Lifecycle of a tracked action. Only `Active` items are watched for due dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Completed,
    Achieved,
    Archived,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Achieved => "achieved",
            Self::Archived => "archived",
        }
    }

    /// Completed and achieved both count as finished work.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed | Self::Achieved)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "achieved" => Ok(Self::Achieved),
            "archived" => Ok(Self::Archived),
            other => Err(StrataError::InvalidInput(format!(
                "unknown lifecycle state '{other}'"
            ))),
        }
    }
}

/// A project groups tracked actions and owns the list of people responsible for them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Recipient identifiers for due-date notifications.
    pub responsible_parties: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: &str, responsible_parties: Vec<String>) -> Self {
        Self {
            id: new_id("prj"),
            name: name.to_string(),
            responsible_parties,
            created_at: Utc::now(),
        }
    }
}

/// A unit of work with an optional due date (an "action" in the planning UI).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedItem {
    pub id: String,
    /// Owning project; resolved to responsible parties at evaluation time.
    pub project_id: String,
    pub title: String,
    pub due_date: Option<DateTime<Utc>>,
    pub state: LifecycleState,
    /// Percent complete, 0..=100.
    #[serde(default)]
    pub progress: u8,
    /// Planned duration in whole days, used by the critical-path pass.
    #[serde(default = "default_duration")]
    pub duration_days: u32,
    /// Items that must finish before this one starts.
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_duration() -> u32 {
    1
}

impl TrackedItem {
    /// Create a new active item under a project.
    pub fn new(project_id: &str, title: &str, due_date: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id("act"),
            project_id: project_id.to_string(),
            title: title.to_string(),
            due_date,
            state: LifecycleState::Active,
            progress: 0,
            duration_days: default_duration(),
            depends_on: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == LifecycleState::Active
    }
}

/// The fixed day offsets (relative to the due date) at which a notification may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueThreshold {
    InFourteenDays,
    InSevenDays,
    Tomorrow,
    OneDayOverdue,
    SevenDaysOverdue,
}

impl DueThreshold {
    pub const ALL: [DueThreshold; 5] = [
        Self::InFourteenDays,
        Self::InSevenDays,
        Self::Tomorrow,
        Self::OneDayOverdue,
        Self::SevenDaysOverdue,
    ];

    /// Exact-match an offset in days; anything outside the five thresholds is `None`.
    pub fn from_offset(days: i64) -> Option<Self> {
        match days {
            14 => Some(Self::InFourteenDays),
            7 => Some(Self::InSevenDays),
            1 => Some(Self::Tomorrow),
            -1 => Some(Self::OneDayOverdue),
            -7 => Some(Self::SevenDaysOverdue),
            _ => None,
        }
    }

    /// Signed day offset: positive is upcoming, negative is overdue.
    pub fn offset(&self) -> i64 {
        match self {
            Self::InFourteenDays => 14,
            Self::InSevenDays => 7,
            Self::Tomorrow => 1,
            Self::OneDayOverdue => -1,
            Self::SevenDaysOverdue => -7,
        }
    }

    pub fn is_overdue(&self) -> bool {
        self.offset() < 0
    }

    pub fn category(&self) -> NotificationCategory {
        if self.is_overdue() {
            NotificationCategory::Overdue
        } else {
            NotificationCategory::DeadlineApproaching
        }
    }

    /// Phrase used in the notification message, e.g. "is due in 7 days".
    pub fn phrase(&self) -> String {
        match self.offset() {
            1 => "is due tomorrow".to_string(),
            -1 => "is 1 day overdue".to_string(),
            n if n > 0 => format!("is due in {n} days"),
            n => format!("is {} days overdue", -n),
        }
    }
}

impl std::fmt::Display for DueThreshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:+}d", self.offset())
    }
}

/// Category tag carried by every due-date notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    DeadlineApproaching,
    Overdue,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineApproaching => "deadline_approaching",
            Self::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationCategory {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deadline_approaching" => Ok(Self::DeadlineApproaching),
            "overdue" => Ok(Self::Overdue),
            other => Err(StrataError::InvalidInput(format!(
                "unknown notification category '{other}'"
            ))),
        }
    }
}

/// What the scheduler hands to a notification sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DueNotification {
    pub recipients: Vec<String>,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    pub related_entity_id: String,
    pub related_entity_type: String,
}

/// Prefixed random identifier, e.g. `act-3f2a...`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}
