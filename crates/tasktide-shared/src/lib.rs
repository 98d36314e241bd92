//! # tasktide-shared
//!
//! Domain types and the pure computations behind the task API: urgency
//! ranking, points and streaks, recurring-task generation, single-step undo
//! and the analytics reports. Nothing here touches I/O; callers load records,
//! call these functions and persist the results.

pub mod analytics;
pub mod constants;
pub mod error;
pub mod gamification;
pub mod history;
pub mod recurrence;
pub mod task;
pub mod types;
pub mod urgency;

pub use error::{UndoError, ValidationError};
pub use history::{TaskHistoryEntry, TaskSnapshot, UndoPlan};
pub use task::{NewTask, Task, TaskUpdate};
pub use types::*;
