//! Central configuration constants for sync limits and defaults.

use std::time::Duration;

/// Number of progress phases reported by an upload, one per entity kind.
pub const UPLOAD_PHASES: u32 = 4;

/// Number of progress phases reported by a download.
pub const DOWNLOAD_PHASES: u32 = 4;

/// Number of progress phases reported while clearing remote data.
pub const CLEAR_PHASES: u32 = 5;

/// How many recent items the cloud overview returns per kind.
pub const OVERVIEW_RECENT_LIMIT: usize = 5;

/// Default quiet period before a scheduled auto sync starts.
pub const DEFAULT_AUTO_SYNC_DEBOUNCE: Duration = Duration::from_secs(5);

/// Minimum allowed auto sync debounce.
pub const MIN_AUTO_SYNC_DEBOUNCE: Duration = Duration::from_millis(10);

/// Maximum allowed auto sync debounce.
pub const MAX_AUTO_SYNC_DEBOUNCE: Duration = Duration::from_secs(300);

/// Request timeout applied by the HTTP remote adapter.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default backing table names for each entity kind.
pub const RECORDS_TABLE: &str = "exercise_records";
pub const PLANS_TABLE: &str = "study_plans";
pub const KNOWLEDGE_TABLE: &str = "knowledge_items";
pub const SETTINGS_TABLE: &str = "user_settings";

/// Convenience function to clamp a debounce value into allowed range.
pub fn clamp_debounce(v: Duration) -> Duration {
    v.clamp(MIN_AUTO_SYNC_DEBOUNCE, MAX_AUTO_SYNC_DEBOUNCE)
}
