//! # Strata Core
//!
//! Shared building blocks for the Strata planning backend:
//! - domain records (projects, tracked actions, due notifications)
//! - collaborator traits the scheduler is wired through
//! - TOML configuration
//! - planning math (progress roll-up, critical path)

pub mod config;
pub mod error;
pub mod planning;
pub mod traits;
pub mod types;

pub use config::StrataConfig;
pub use error::{Result, StrataError};
pub use types::{
    DueNotification, DueThreshold, LifecycleState, NotificationCategory, Project, TrackedItem,
};
