/// Application name
pub const APP_NAME: &str = "Tasktide";

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Milliseconds in one day, used for due-date proximity
pub const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Urgency time score for tasks due today or overdue
pub const MAX_TIME_SCORE: i64 = 10;

/// Minimum password length accepted at registration
pub const MIN_PASSWORD_LEN: usize = 6;

/// Minimum query length for user search
pub const MIN_USER_SEARCH_LEN: usize = 2;

/// Maximum results returned by user search
pub const USER_SEARCH_LIMIT: usize = 10;

/// Default page size for task listing
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Entries per suggestion bucket
pub const SUGGESTION_LIMIT: usize = 5;

/// Entries per bottleneck list
pub const BOTTLENECK_LIMIT: usize = 10;

/// Tags reported in the analytics overview
pub const TOP_TAGS_LIMIT: usize = 10;

/// Default window for the productivity report, in days
pub const DEFAULT_PRODUCTIVITY_DAYS: u32 = 7;
