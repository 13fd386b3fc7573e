//! Named filtering and retention strategies.
//!
//! Deployments have run with different dedup radii, with and without the
//! in-batch corroboration check, and with eviction keyed on either the
//! persistence timestamp or the feed's acquisition date. Each combination is a
//! named, explicitly configured strategy here.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::types::FireEvent;

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Distance thresholds for the novelty filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterPolicy {
    /// A cached event closer than this (meters) makes a candidate a duplicate.
    pub dedup_radius_m: f64,
    /// When set, a candidate needs another candidate in the same batch closer
    /// than this (meters), otherwise it is dropped as isolated noise.
    pub proximity_radius_m: Option<f64>,
}

impl FilterPolicy {
    pub const CORROBORATED_DEDUP_RADIUS_M: f64 = 100.0;
    pub const CORROBORATED_PROXIMITY_RADIUS_M: f64 = 10_000.0;
    pub const DEDUP_ONLY_RADIUS_M: f64 = 1_000.0;

    /// Strict policy: 100 m dedup plus 10 km corroboration. The default.
    pub const fn corroborated() -> Self {
        Self {
            dedup_radius_m: Self::CORROBORATED_DEDUP_RADIUS_M,
            proximity_radius_m: Some(Self::CORROBORATED_PROXIMITY_RADIUS_M),
        }
    }

    /// Loose policy: 1 km dedup, no corroboration requirement.
    pub const fn dedup_only() -> Self {
        Self {
            dedup_radius_m: Self::DEDUP_ONLY_RADIUS_M,
            proximity_radius_m: None,
        }
    }

    /// Resolve a policy by its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "corroborated" | "strict" => Some(Self::corroborated()),
            "dedup_only" | "loose" => Some(Self::dedup_only()),
            _ => None,
        }
    }
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::corroborated()
    }
}

// ---------------------------------------------------------------------------
// Retention
// ---------------------------------------------------------------------------

/// Which event field ages an event out, and how far back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Evict on persistence time. The default (24 hours).
    RecordedAt { max_age: Duration },
    /// Evict on the feed's calendar acquisition date.
    AcquisitionDate { max_age_days: i64 },
}

impl RetentionPolicy {
    pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

    /// Compute the cutoff for a sweep happening at `now`.
    ///
    /// A window reaching past the start of representable time saturates to
    /// the earliest date, so nothing expires.
    pub fn cutoff(&self, now: DateTime<Utc>) -> ExpiryCutoff {
        match *self {
            Self::RecordedAt { max_age } => ExpiryCutoff::RecordedBefore(
                now.checked_sub_signed(max_age)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            ),
            Self::AcquisitionDate { max_age_days } => ExpiryCutoff::AcquiredBefore(
                Duration::try_days(max_age_days)
                    .and_then(|window| now.date_naive().checked_sub_signed(window))
                    .unwrap_or(NaiveDate::MIN),
            ),
        }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::RecordedAt {
            max_age: Duration::hours(Self::DEFAULT_MAX_AGE_HOURS),
        }
    }
}

/// Concrete eviction boundary. Strictly-older events expire; an event exactly
/// at the cutoff is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCutoff {
    RecordedBefore(DateTime<Utc>),
    AcquiredBefore(NaiveDate),
}

impl ExpiryCutoff {
    pub fn is_expired(&self, event: &FireEvent) -> bool {
        match *self {
            Self::RecordedBefore(cutoff) => event.recorded_at < cutoff,
            Self::AcquiredBefore(cutoff) => event.detection.acq_date < cutoff,
        }
    }
}

impl std::fmt::Display for ExpiryCutoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordedBefore(ts) => write!(f, "recorded_at < {}", ts.to_rfc3339()),
            Self::AcquiredBefore(date) => write!(f, "acq_date < {date}"),
        }
    }
}
