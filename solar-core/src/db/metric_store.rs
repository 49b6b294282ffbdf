//! In-memory metric store.
//!
//! Partitions live in a `DashMap` keyed by (site, day, kind). A write takes
//! the lock of the shard holding its partition only, so writers to unrelated
//! partitions never wait on each other, and two writers racing on the same
//! minute are applied one after the other (last write wins).

use std::collections::BTreeMap;

use dashmap::{DashMap, DashSet};
use time::{Date, Duration, OffsetDateTime};

use super::{MetricStore, StoreError};
use crate::domain::{
    minute::{minute_of_day, timestamp_for_minute, today, utc_day, MINUTES_PER_DAY},
    Measurement, MeasurementKind, Reading, SiteId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub site: SiteId,
    pub day: Date,
    pub kind: MeasurementKind,
}

/// Minute-of-day to value. Never more than 1440 entries.
type Partition = BTreeMap<u16, f64>;

#[derive(Default)]
pub struct MemoryMetricStore {
    sites: DashSet<SiteId>,
    partitions: DashMap<PartitionKey, Partition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    pub site_count: usize,
    pub partition_count: usize,
    pub value_count: usize,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            site_count: self.sites.len(),
            partition_count: self.partitions.len(),
            value_count: self.partitions.iter().map(|p| p.len()).sum(),
        }
    }

    fn check_site(&self, site: SiteId) -> Result<(), StoreError> {
        if self.sites.contains(&site) {
            Ok(())
        } else {
            Err(StoreError::UnknownSite(site))
        }
    }
}

#[async_trait::async_trait]
impl MetricStore for MemoryMetricStore {
    async fn ensure_site(&self, site: SiteId) -> Result<(), StoreError> {
        self.sites.insert(site);
        Ok(())
    }

    async fn record(
        &self,
        site: SiteId,
        timestamp: OffsetDateTime,
        kind: MeasurementKind,
        value: f64,
    ) -> Result<Option<f64>, StoreError> {
        self.sites.insert(site);

        let key = PartitionKey {
            site,
            day: utc_day(timestamp),
            kind,
        };
        let minute = minute_of_day(timestamp);

        let previous = self.partitions.entry(key).or_default().insert(minute, value);
        if let Some(prev) = previous {
            tracing::debug!(%site, %kind, minute, prev, value, "minute value overwritten");
        }

        Ok(previous)
    }

    async fn measurements(
        &self,
        site: SiteId,
        kind: MeasurementKind,
        day: Option<Date>,
    ) -> Result<Vec<Measurement>, StoreError> {
        self.check_site(site)?;

        let day = day.unwrap_or_else(today);
        let key = PartitionKey { site, day, kind };

        let values = self
            .partitions
            .get(&key)
            .map(|part| {
                part.iter()
                    .map(|(minute, value)| Measurement {
                        timestamp: timestamp_for_minute(day, *minute),
                        value: *value,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(values)
    }

    async fn recent(
        &self,
        site: SiteId,
        kind: MeasurementKind,
        until: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<Measurement>, StoreError> {
        self.check_site(site)?;

        let mut out = Vec::with_capacity(limit.min(usize::from(MINUTES_PER_DAY)));
        let first_day = utc_day(until);
        let until_minute = minute_of_day(until);

        // Enough days to hold `limit` minutes, plus the partial day we start in.
        let max_days = limit.div_ceil(usize::from(MINUTES_PER_DAY)) + 1;

        for offset in 0..max_days {
            if out.len() >= limit {
                break;
            }
            let Some(day) = first_day.checked_sub(Duration::days(offset as i64)) else {
                break;
            };
            let Some(part) = self.partitions.get(&PartitionKey { site, day, kind }) else {
                continue;
            };

            let upper = if offset == 0 { until_minute } else { MINUTES_PER_DAY - 1 };
            for (minute, value) in part.range(..=upper).rev() {
                if out.len() >= limit {
                    break;
                }
                out.push(Measurement {
                    timestamp: timestamp_for_minute(day, *minute),
                    value: *value,
                });
            }
        }

        out.reverse();
        Ok(out)
    }
}

/// Record every measurement a reading carries. Returns how many minute slots
/// were written.
pub async fn record_reading<S>(store: &S, reading: &Reading) -> Result<usize, StoreError>
where
    S: MetricStore + ?Sized,
{
    let mut written = 0;
    for kind in MeasurementKind::ALL {
        if let Some(value) = reading.value_for(kind) {
            store.record(reading.site_id, reading.timestamp, kind, value).await?;
            written += 1;
        }
    }
    Ok(written)
}
