//! Duration parsing and reconciliation.
//!
//! The cinema page reports durations as "170 minutos"; IMDb reports
//! "2h 50m". Agreement between the two (within a configured tolerance)
//! is what authorizes trusting an IMDb match enough to record its
//! ratings.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// A duration string that could not be interpreted. Callers treat this
/// as a maximal mismatch, never as a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable duration: {0:?}")]
pub struct DurationParseError(pub String);

static HOURS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*h").unwrap());
static MINUTES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*m").unwrap());

/// Parse a cinema-page duration ("170 minutos") into total minutes.
/// Only the first whitespace-delimited token is significant.
pub fn parse_local_duration(raw: &str) -> Result<u32, DurationParseError> {
    raw.split_whitespace()
        .next()
        .and_then(|tok| tok.parse().ok())
        .ok_or_else(|| DurationParseError(raw.to_string()))
}

/// Parse an IMDb duration ("2h 50m", "45m", "3h") into total minutes.
/// Either component may be absent; at least one must be present.
pub fn parse_external_duration(raw: &str) -> Result<u32, DurationParseError> {
    let hours = HOURS
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());
    let minutes = MINUTES
        .captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok());

    match (hours, minutes) {
        (None, None) => Err(DurationParseError(raw.to_string())),
        (h, m) => Ok(h.unwrap_or(0) * 60 + m.unwrap_or(0)),
    }
}

/// Absolute difference in minutes between the two reported durations.
pub fn reconcile(local_minutes: u32, external_minutes: u32) -> u32 {
    local_minutes.abs_diff(external_minutes)
}

/// Whether the difference is small enough to trust the match and record
/// its ratings.
pub fn within_tolerance(difference: u32, tolerance_minutes: u32) -> bool {
    difference <= tolerance_minutes
}
