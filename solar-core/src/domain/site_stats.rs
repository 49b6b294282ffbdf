use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Reading;

/// Per-site, per-day reporting summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteStats {
    #[serde(with = "time::serde::rfc3339")]
    pub last_reporting_time: OffsetDateTime,
    pub meter_reading_count: u64,
    pub max_wh_generated: Option<f64>,
    pub min_wh_generated: Option<f64>,
    pub max_capacity: Option<f64>,
}

impl SiteStats {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            last_reporting_time: now,
            meter_reading_count: 0,
            max_wh_generated: None,
            min_wh_generated: None,
            max_capacity: None,
        }
    }

    /// Fold one reading in. Extrema only move when the new value beats the
    /// stored one.
    pub fn apply(&mut self, reading: &Reading, now: OffsetDateTime) {
        self.last_reporting_time = now;
        self.meter_reading_count += 1;

        if let Some(wh) = reading.wh_generated {
            self.max_wh_generated = Some(self.max_wh_generated.map_or(wh, |cur| cur.max(wh)));
            self.min_wh_generated = Some(self.min_wh_generated.map_or(wh, |cur| cur.min(wh)));
        }
        if let Some(cap) = reading.capacity() {
            self.max_capacity = Some(self.max_capacity.map_or(cap, |cur| cur.max(cap)));
        }
    }
}
