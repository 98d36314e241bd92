//! # tasktide-server
//!
//! REST API for the tasktide task manager.
//!
//! This crate provides:
//! - **Accounts** with argon2 password hashes and bearer-token sessions
//! - **Tasks**: CRUD, sharing, recurring tasks, attachments, bulk actions,
//!   history and single-step undo
//! - **Analytics**: overview, productivity, streaks, bottlenecks and
//!   gamification reports
//! - **Notifications** stored per user
//! - **Per-IP rate limiting** to protect against abuse

pub mod analytics;
pub mod api;
pub mod attachments;
pub mod auth;
pub mod config;
pub mod error;
pub mod notifications;
pub mod rate_limit;
pub mod tasks;
pub mod users;

pub use api::{build_router, serve, AppState};
pub use config::ServerConfig;
pub use error::ServerError;
