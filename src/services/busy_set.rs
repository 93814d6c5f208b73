use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::calendar::{BusyInterval, ProviderBusyBatch};

/// Externally synced busy intervals, sorted by start time.
///
/// Intervals from different providers may overlap each other; they are kept as-is
/// so callers can still see which provider blocked a slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BusySet {
    intervals: Vec<BusyInterval>,
}

impl BusySet {
    pub fn new(intervals: Vec<BusyInterval>) -> AppResult<Self> {
        for interval in &intervals {
            if interval.end <= interval.start {
                return Err(AppError::validation_with_details(
                    "Busy interval must end after it starts",
                    json!({
                        "start": interval.start.to_rfc3339(),
                        "end": interval.end.to_rfc3339(),
                        "provider": interval.provider,
                    }),
                ));
            }
        }

        let mut intervals = intervals;
        intervals.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.end.cmp(&b.end)));
        Ok(Self { intervals })
    }

    /// Merges provider batches; each interval is tagged with its batch's provider label.
    pub fn from_sources(batches: Vec<ProviderBusyBatch>) -> AppResult<Self> {
        let mut merged = Vec::new();
        for batch in batches {
            debug!(
                target: "app::calendar",
                provider = %batch.provider,
                count = batch.intervals.len(),
                "merging provider busy intervals"
            );
            for mut interval in batch.intervals {
                if interval.provider.is_none() {
                    interval.provider = Some(batch.provider.clone());
                }
                merged.push(interval);
            }
        }
        Self::new(merged)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[BusyInterval] {
        &self.intervals
    }

    /// Earliest-starting interval intersecting `[start, end)`.
    pub fn first_conflict(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<&BusyInterval> {
        self.intervals
            .iter()
            .take_while(|interval| interval.start < end)
            .find(|interval| interval.overlaps(start, end))
    }

    pub fn is_free(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.first_conflict(start, end).is_none()
    }
}
