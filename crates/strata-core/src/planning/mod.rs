//! Planning math over a project's tracked items.
//!
//! - `progress`: roll-up of lifecycle states and percent complete
//! - `critical_path`: forward/backward pass producing float and critical flags

pub mod critical_path;
pub mod progress;

pub use critical_path::{ScheduleTiming, compute_critical_path};
pub use progress::{ProgressSummary, rollup};
