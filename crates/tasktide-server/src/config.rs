//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use tasktide_shared::constants::DEFAULT_HTTP_PORT;

/// Largest accepted `DAY_OFFSET_MINUTES`, in either direction.
const MAX_DAY_OFFSET_MINUTES: i32 = 14 * 60;

const DEFAULT_SESSION_TTL_HOURS: i64 = 168;

/// Ten years.
const MAX_SESSION_TTL_HOURS: i64 = 24 * 365 * 10;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: none (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Directory where task attachments are written.
    /// Env: `UPLOAD_PATH`
    /// Default: `./uploads`
    pub upload_path: PathBuf,

    /// Maximum size of a single attachment in bytes.
    /// Env: `MAX_UPLOAD_SIZE`
    /// Default: 10 MiB
    pub max_upload_size: usize,

    /// Maximum number of files in one attachment upload.
    /// Env: `MAX_FILES_PER_UPLOAD`
    /// Default: `5`
    pub max_files_per_upload: usize,

    /// Lifetime of a login session.
    /// Env: `SESSION_TTL_HOURS`
    /// Default: `168` (one week)
    pub session_ttl_hours: i64,

    /// Offset from UTC that defines the calendar day for streaks.
    /// Env: `DAY_OFFSET_MINUTES`
    /// Default: `0`
    pub day_offset_minutes: i32,

    /// Requests allowed per client IP within one window.
    /// Env: `RATE_LIMIT_PER_WINDOW`
    /// Default: `100`
    pub rate_limit_per_window: u32,

    /// Length of the rate-limit window.
    /// Env: `RATE_LIMIT_WINDOW_SECS`
    /// Default: `900` (15 minutes)
    pub rate_limit_window_secs: u64,

    // -- Self-hosted instance settings --

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Tasktide"`
    pub instance_name: String,

    /// Whether new accounts may be created.
    /// Env: `REGISTRATION_OPEN` (true/false)
    /// Default: `true`
    pub registration_open: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            upload_path: PathBuf::from("./uploads"),
            max_upload_size: 10 * 1024 * 1024, // 10 MiB
            max_files_per_upload: 5,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            day_offset_minutes: 0,
            rate_limit_per_window: 100,
            rate_limit_window_secs: 15 * 60,
            instance_name: tasktide_shared::constants::APP_NAME.to_string(),
            registration_open: true,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(path) = lookup("UPLOAD_PATH") {
            config.upload_path = PathBuf::from(path);
        }

        parse_into(&lookup, "MAX_UPLOAD_SIZE", &mut config.max_upload_size);
        parse_into(&lookup, "MAX_FILES_PER_UPLOAD", &mut config.max_files_per_upload);
        let mut ttl = config.session_ttl_hours;
        parse_into(&lookup, "SESSION_TTL_HOURS", &mut ttl);
        if session_ttl_in_range(ttl) {
            config.session_ttl_hours = ttl;
        } else {
            tracing::warn!(value = ttl, "SESSION_TTL_HOURS out of range, using default");
        }
        parse_into(&lookup, "RATE_LIMIT_PER_WINDOW", &mut config.rate_limit_per_window);
        parse_into(&lookup, "RATE_LIMIT_WINDOW_SECS", &mut config.rate_limit_window_secs);

        let mut offset = config.day_offset_minutes;
        parse_into(&lookup, "DAY_OFFSET_MINUTES", &mut offset);
        if offset.abs() <= MAX_DAY_OFFSET_MINUTES {
            config.day_offset_minutes = offset;
        } else {
            tracing::warn!(value = offset, "DAY_OFFSET_MINUTES out of range, using default");
        }

        // -- Self-hosted settings --

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(val) = lookup("REGISTRATION_OPEN") {
            config.registration_open = val != "false" && val != "0";
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// The timezone whose calendar days count for streaks.
    pub fn day_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.day_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        let hours = if session_ttl_in_range(self.session_ttl_hours) {
            self.session_ttl_hours
        } else {
            DEFAULT_SESSION_TTL_HOURS
        };
        chrono::Duration::try_hours(hours).unwrap_or_else(|| chrono::Duration::weeks(1))
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs.max(1))
    }

    /// Request body cap: a full attachment upload plus some multipart framing.
    pub fn body_limit(&self) -> usize {
        self.max_upload_size
            .saturating_mul(self.max_files_per_upload.max(1))
            .saturating_add(64 * 1024)
    }
}

fn session_ttl_in_range(hours: i64) -> bool {
    (1..=MAX_SESSION_TTL_HOURS).contains(&hours)
}

fn parse_into<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "Invalid value, using default"),
        }
    }
}
