//! Application configuration constants
//!
//! Central location for all configuration constants, resource limits,
//! and validation boundaries used throughout the application.

use std::path::PathBuf;
use std::time::Duration;

// ===== Dua Request Limits =====

/// Minimum trimmed length of dua request text
pub const MIN_DUA_TEXT_LENGTH: usize = 10;

/// Maximum trimmed length of dua request text.
/// Applied at the repository boundary for both submission and edits.
pub const MAX_DUA_TEXT_LENGTH: usize = 500;

/// Maximum length of the optional note attached when a dua is answered
pub const MAX_ANSWER_NOTE_LENGTH: usize = 500;

// ===== Announcement Limits =====

/// Maximum announcement title length
pub const MAX_ANNOUNCEMENT_TITLE_LENGTH: usize = 120;

/// Maximum announcement content length
pub const MAX_ANNOUNCEMENT_CONTENT_LENGTH: usize = 2_000;

/// Maximum comment length on an announcement
pub const MAX_COMMENT_LENGTH: usize = 500;

// ===== Brother Form Limits =====

/// Maximum length of a brother's name
pub const MAX_NAME_LENGTH: usize = 100;

/// Minimum number of digits in a phone number
pub const MIN_PHONE_DIGITS: usize = 7;

/// Maximum number of digits in a phone number (E.164)
pub const MAX_PHONE_DIGITS: usize = 15;

/// Maximum length for free-text notes on brothers and interactions
pub const MAX_NOTES_LENGTH: usize = 1_000;

// ===== Goal Limits =====

/// Maximum goal target per period
pub const MAX_GOAL_TARGET: u32 = 10_000;

/// Maximum goal title length
pub const MAX_GOAL_TITLE_LENGTH: usize = 100;

// ===== Contact Status Thresholds (days since last contact) =====

/// Contacted within this many days counts as "recent"
pub const RECENT_CONTACT_DAYS: i64 = 7;

/// Beyond this many days a brother "needs contact"
pub const NEEDS_CONTACT_DAYS: i64 = 21;

/// Beyond this many days contact is "urgent"
pub const URGENT_CONTACT_DAYS: i64 = 30;

// ===== Notifications =====

/// Only the most recent notifications are kept
pub const MAX_NOTIFICATIONS: usize = 50;

/// Delay between marking a notification read and removing it
pub const READ_NOTIFICATION_TTL: Duration = Duration::from_secs(3);

// ===== Reminder Schedules (six-field cron, seconds first) =====

/// Weekly contact reminder, Fridays at 09:00
pub const CONTACT_REMINDER_CRON: &str = "0 0 9 * * Fri";

/// Daily goal reminder at 20:00
pub const GOAL_REMINDER_CRON: &str = "0 0 20 * * *";

// ===== Runtime =====

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "BROTHERHOOD_DATA_DIR";

/// Resolve the application data directory.
///
/// Falls back to `./brotherhood-data` when the environment does not name one.
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("brotherhood-data"))
}
