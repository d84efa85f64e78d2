//! Canonical default values shared across the workspace.

use std::time::Duration;

/// Worker pool size and notification channel capacity.
pub const DEFAULT_MAX_CONCURRENT_WORKERS: usize = 1;
/// Per-job wall-clock budget.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(10 * 60);
/// Explorer inner-loop cap.
pub const DEFAULT_MAX_ITERATIONS: u32 = 50;

pub const DEFAULT_MAX_NAME_LENGTH: usize = 255;
pub const DEFAULT_MAX_DESCRIPTION_LENGTH: usize = 5_000;
pub const DEFAULT_MAX_STEPS_JSON_LENGTH: usize = 50_000;
pub const DEFAULT_MAX_STEPS_COUNT: usize = 200;

pub const DEFAULT_DB_URL: &str = "sqlite:cartograph.sqlite?mode=rwc";

pub const STOPPED_BY_USER_MESSAGE: &str = "stopped by user";
