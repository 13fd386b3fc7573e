use std::fmt;

use firewatch_common::ExpiryCutoff;

use crate::spatial_filter::FilterStats;

/// Stats from one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: u32,
    pub unparseable: u32,
    pub filter: FilterStats,
    pub persisted: u32,
    /// The cache was updated but its snapshot could not be written.
    pub snapshot_failed: bool,
    pub notifications: FanoutStats,
}

/// Stats from one retention sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepStats {
    pub cutoff: Option<ExpiryCutoff>,
    pub deleted: u32,
    pub evicted_from_cache: u32,
    pub snapshot_failed: bool,
}

/// Stats from notification fan-out, summed across events.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutStats {
    pub subscribers: u32,
    pub in_range: u32,
    pub sent: u32,
    pub failed: u32,
    pub tokens_cleared: u32,
}

impl FanoutStats {
    pub fn absorb(&mut self, other: &FanoutStats) {
        self.subscribers += other.subscribers;
        self.in_range += other.in_range;
        self.sent += other.sent;
        self.failed += other.failed;
        self.tokens_cleared += other.tokens_cleared;
    }
}

impl fmt::Display for IngestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fetched={} unparseable={} duplicates={} isolated={} persisted={}",
            self.fetched,
            self.unparseable,
            self.filter.duplicates,
            self.filter.isolated,
            self.persisted
        )?;
        if self.notifications.in_range > 0 {
            write!(
                f,
                " notified={}/{} tokens_cleared={}",
                self.notifications.sent, self.notifications.in_range, self.notifications.tokens_cleared
            )?;
        }
        if self.snapshot_failed {
            write!(f, " (snapshot write failed)")?;
        }
        Ok(())
    }
}

impl fmt::Display for SweepStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cutoff {
            Some(cutoff) => write!(f, "cutoff=[{cutoff}]")?,
            None => write!(f, "cutoff=[none]")?,
        }
        write!(
            f,
            " deleted={} evicted_from_cache={}",
            self.deleted, self.evicted_from_cache
        )?;
        if self.snapshot_failed {
            write!(f, " (snapshot write failed)")?;
        }
        Ok(())
    }
}
