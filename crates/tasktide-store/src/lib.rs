//! # tasktide-store
//!
//! SQLite persistence for tasktide.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed CRUD helpers for every domain
//! record. Callers in async code are expected to hold it behind a mutex and
//! never across an `.await`.

pub mod database;
pub mod history;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod sessions;
pub mod tasks;
pub mod users;

mod convert;
mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
pub use tasks::{TaskFilter, TaskSort};
pub use tasktide_shared::{Task, TaskHistoryEntry};
