//! Flush trigger policy.
//!
//! Pure functions over a stats snapshot: no side effects, safe to call with
//! stale stats. The count threshold takes precedence; the elapsed-time
//! threshold is only consulted when no count is configured. Callers must
//! evaluate after every single append so an exact count match is never
//! skipped.

use chrono::{DateTime, Utc};

use crate::buffer::BufferStats;
use crate::config::{CountMatch, FlushWindow, LoggerConfiguration};

/// Why the policy did or did not ask for a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Count threshold reached.
    CountReached,
    /// Elapsed-time threshold reached.
    WindowElapsed,
    /// A threshold is configured but not yet reached.
    NotDue,
    /// No thresholds; the immediate path handles these records.
    Disabled,
}

impl FlushDecision {
    pub fn is_due(&self) -> bool {
        matches!(self, Self::CountReached | Self::WindowElapsed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CountReached => "count_reached",
            Self::WindowElapsed => "window_elapsed",
            Self::NotDue => "not_due",
            Self::Disabled => "disabled",
        }
    }
}

/// Evaluates the policy and reports the reason.
pub fn evaluate(
    stats: &BufferStats,
    config: &LoggerConfiguration,
    now: DateTime<Utc>,
) -> FlushDecision {
    evaluate_with(stats, config, config.count_match, now)
}

/// Like [`evaluate`], but a count already past an exact threshold is due.
///
/// Used to re-check a buffer whose exact match was skipped while another
/// flush held the session's token.
pub fn evaluate_overdue(
    stats: &BufferStats,
    config: &LoggerConfiguration,
    now: DateTime<Utc>,
) -> FlushDecision {
    evaluate_with(stats, config, CountMatch::AtLeast, now)
}

fn evaluate_with(
    stats: &BufferStats,
    config: &LoggerConfiguration,
    count_match: CountMatch,
    now: DateTime<Utc>,
) -> FlushDecision {
    if config.flush_count > 0 {
        let threshold = config.flush_count as usize;
        let reached = match count_match {
            CountMatch::Exact => stats.count == threshold,
            CountMatch::AtLeast => stats.count >= threshold,
        };
        return if reached {
            FlushDecision::CountReached
        } else {
            FlushDecision::NotDue
        };
    }

    if !config.flush_after.is_zero() {
        if stats.is_empty() {
            return FlushDecision::NotDue;
        }
        let start = match config.flush_window {
            FlushWindow::SinceFirstRecord => stats.first_timestamp,
            FlushWindow::SinceSessionStart => {
                config.session_started_at.or(stats.first_timestamp)
            }
        };
        let Some(start) = start else {
            return FlushDecision::NotDue;
        };
        // negative elapsed (start in the future) never triggers
        return match (now - start).to_std() {
            Ok(elapsed) if elapsed >= config.flush_after => FlushDecision::WindowElapsed,
            _ => FlushDecision::NotDue,
        };
    }

    FlushDecision::Disabled
}

/// `true` when the buffer described by `stats` should be flushed now.
pub fn should_flush(stats: &BufferStats, config: &LoggerConfiguration, now: DateTime<Utc>) -> bool {
    evaluate(stats, config, now).is_due()
}
