//! Resource age computation and formatting

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{CoreError, Result};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Seconds elapsed since `created`, relative to now
pub fn compute_age(created: DateTime<Utc>) -> u64 {
    compute_age_at(created, Utc::now())
}

/// Seconds elapsed between `created` and `now`; timestamps in the future count as zero
pub fn compute_age_at(created: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    now.signed_duration_since(created).num_seconds().max(0) as u64
}

/// Compact age: `{d}d {h}h`, `{h}h {m}m`, or `{m}m`
pub fn format_age(seconds: u64) -> String {
    let days = seconds / DAY;
    let hours = (seconds % DAY) / HOUR;
    let minutes = (seconds % HOUR) / MINUTE;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Parse a human threshold such as `7d`, `12h`, or `90m`
pub fn parse_age_threshold(value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim()).map_err(|e| CoreError::InvalidDuration {
        value: value.to_string(),
        message: e.to_string(),
    })
}
