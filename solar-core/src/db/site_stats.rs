use dashmap::DashMap;
use time::{Date, OffsetDateTime};

use crate::domain::{minute::utc_day, Reading, SiteId, SiteStats};

/// Daily [`SiteStats`] keyed by (site, UTC day of the reading).
#[derive(Default)]
pub struct SiteStatsStore {
    stats: DashMap<(SiteId, Date), SiteStats>,
}

impl SiteStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare-and-update under the entry lock, so concurrent readings for the
    /// same site/day never lose an extremum or a count.
    pub fn update(&self, reading: &Reading, now: OffsetDateTime) -> SiteStats {
        let key = (reading.site_id, utc_day(reading.timestamp));
        let mut entry = self.stats.entry(key).or_insert_with(|| SiteStats::new(now));
        entry.apply(reading, now);
        entry.clone()
    }

    pub fn find(&self, site: SiteId, day: Date) -> Option<SiteStats> {
        self.stats.get(&(site, day)).map(|s| s.clone())
    }

    /// Every (site, day) that has received a reading, sorted.
    pub fn site_days(&self) -> Vec<(SiteId, Date)> {
        let mut keys: Vec<_> = self.stats.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::{date, datetime};

    fn reading(site: i64, ts: OffsetDateTime, generated: f64) -> Reading {
        Reading {
            site_id: SiteId(site),
            timestamp: ts,
            wh_used: Some(0.0),
            wh_generated: Some(generated),
            temp_c: None,
        }
    }

    #[test]
    fn stats_are_kept_per_site_and_day() {
        let store = SiteStatsStore::new();
        let now = datetime!(2024-01-02 00:00:10 UTC);

        store.update(&reading(1, datetime!(2024-01-01 10:00:00 UTC), 3.0), now);
        store.update(&reading(1, datetime!(2024-01-02 10:00:00 UTC), 1.0), now);
        store.update(&reading(2, datetime!(2024-01-01 10:00:00 UTC), 9.0), now);

        let s = store.find(SiteId(1), date!(2024 - 01 - 01)).unwrap();
        assert_eq!(s.meter_reading_count, 1);
        assert_eq!(s.max_wh_generated, Some(3.0));
        assert_eq!(s.last_reporting_time, now);

        assert!(store.find(SiteId(3), date!(2024 - 01 - 01)).is_none());

        assert_eq!(
            store.site_days(),
            vec![
                (SiteId(1), date!(2024 - 01 - 01)),
                (SiteId(1), date!(2024 - 01 - 02)),
                (SiteId(2), date!(2024 - 01 - 01)),
            ]
        );
    }

    #[test]
    fn concurrent_updates_keep_every_count() {
        let store = Arc::new(SiteStatsStore::new());
        let now = datetime!(2024-01-01 12:00:00 UTC);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let wh = f64::from(t * 100 + i);
                        store.update(&reading(1, datetime!(2024-01-01 11:00:00 UTC), wh), now);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let s = store.find(SiteId(1), date!(2024 - 01 - 01)).unwrap();
        assert_eq!(s.meter_reading_count, 800);
        assert_eq!(s.max_wh_generated, Some(799.0));
        assert_eq!(s.min_wh_generated, Some(0.0));
    }
}
