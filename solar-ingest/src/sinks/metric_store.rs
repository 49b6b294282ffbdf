use std::{sync::Arc, time::SystemTime};

use futures::StreamExt;
use solar_core::{
    db::{record_reading, MetricStore, ReadingFeed, SiteStatsStore},
    domain::Reading,
};
use time::OffsetDateTime;

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Terminal stage: folds each reading into the metric store, the daily site
/// stats and the recent-reading feed.
///
/// A reading the site feed already holds is a replay: the store write is
/// repeated (last write wins, so nothing changes) but the daily stats are not
/// counted twice.
///
/// Record-level failures from upstream (parse errors, rejections, unknown
/// sites) are logged and skipped. A store failure stops the sink; retrying is
/// left to whoever owns the storage medium.
pub struct MetricStoreSink {
    store: Arc<dyn MetricStore>,
    stats: Arc<SiteStatsStore>,
    feed: Arc<ReadingFeed>,
}

impl MetricStoreSink {
    pub fn new(store: Arc<dyn MetricStore>, stats: Arc<SiteStatsStore>, feed: Arc<ReadingFeed>) -> Self {
        Self { store, stats, feed }
    }

    async fn write(&self, env: &Envelope<Reading>) -> Result<(), PipelineError> {
        let reading = &env.payload;

        let written = record_reading(self.store.as_ref(), reading).await?;
        if self.feed.insert(reading) {
            self.stats.update(reading, OffsetDateTime::now_utc());
        } else {
            metrics::counter!("feed_duplicate_readings_total").increment(1);
            tracing::debug!(site_id = %reading.site_id, "replayed reading, stats left unchanged");
        }

        metrics::counter!("store_ingested_readings_total").increment(1);
        metrics::counter!("store_minute_values_written_total").increment(written as u64);
        if let Ok(dur) = SystemTime::now().duration_since(env.received_at) {
            metrics::histogram!("ingest_end_to_end_latency_seconds").record(dur.as_secs_f64());
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink<Reading> for MetricStoreSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<Reading>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) if e.is_record_level() => {
                    tracing::warn!(error = %e, "skipping reading");
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, "error in upstream pipeline for MetricStoreSink");
                    return Err(e);
                }
            };

            if let Err(e) = self.write(&env).await {
                tracing::error!(
                    error = %e,
                    site_id = %env.payload.site_id,
                    "metric store write failed, stopping sink"
                );
                metrics::counter!("store_sink_errors_total").increment(1);
                return Err(e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solar_core::{
        db::MemoryMetricStore,
        domain::{MeasurementKind, SiteId},
        StoreError,
    };
    use time::{
        macros::{date, datetime},
        Date,
    };

    fn reading(minute: u8, generated: f64) -> Envelope<Reading> {
        Envelope::now(Reading {
            site_id: SiteId(42),
            timestamp: datetime!(2024-01-01 00:00:00 UTC) + time::Duration::minutes(i64::from(minute)),
            wh_used: Some(0.5),
            wh_generated: Some(generated),
            temp_c: None,
        })
    }

    #[tokio::test]
    async fn records_skips_bad_items_and_updates_side_tables() {
        let store = Arc::new(MemoryMetricStore::new());
        let stats = Arc::new(SiteStatsStore::new());
        let feed = Arc::new(ReadingFeed::default());
        let sink = MetricStoreSink::new(store.clone(), stats.clone(), feed.clone());

        let items = vec![
            Ok(reading(0, 1.5)),
            Err(PipelineError::UnknownSite(SiteId(9))),
            Ok(reading(1, 2.0)),
        ];
        sink.run(futures::stream::iter(items)).await.unwrap();

        let values = store
            .measurements(SiteId(42), MeasurementKind::KwhGenerated, Some(date!(2024 - 01 - 01)))
            .await
            .unwrap();
        assert_eq!(values.len(), 2);

        let day_stats = stats.find(SiteId(42), date!(2024 - 01 - 01)).unwrap();
        assert_eq!(day_stats.meter_reading_count, 2);
        assert_eq!(day_stats.max_wh_generated, Some(2.0));
        assert_eq!(feed.recent_for_site(SiteId(42), 10).len(), 2);
    }

    #[tokio::test]
    async fn replayed_reading_is_counted_once() {
        let store = Arc::new(MemoryMetricStore::new());
        let stats = Arc::new(SiteStatsStore::new());
        let sink = MetricStoreSink::new(store.clone(), stats.clone(), Arc::new(ReadingFeed::default()));

        let items = vec![Ok(reading(0, 1.5)), Ok(reading(0, 1.5)), Ok(reading(1, 2.0))];
        sink.run(futures::stream::iter(items)).await.unwrap();

        let day_stats = stats.find(SiteId(42), date!(2024 - 01 - 01)).unwrap();
        assert_eq!(day_stats.meter_reading_count, 2);
        assert_eq!(store.stats().value_count, 4);
    }

    struct DownStore;

    #[async_trait::async_trait]
    impl MetricStore for DownStore {
        async fn ensure_site(&self, _site: SiteId) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn record(
            &self,
            _site: SiteId,
            _timestamp: OffsetDateTime,
            _kind: MeasurementKind,
            _value: f64,
        ) -> Result<Option<f64>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn measurements(
            &self,
            _site: SiteId,
            _kind: MeasurementKind,
            _day: Option<Date>,
        ) -> Result<Vec<solar_core::Measurement>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn recent(
            &self,
            _site: SiteId,
            _kind: MeasurementKind,
            _until: OffsetDateTime,
            _limit: usize,
        ) -> Result<Vec<solar_core::Measurement>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failure_stops_the_sink() {
        let feed = Arc::new(ReadingFeed::default());
        let sink = MetricStoreSink::new(Arc::new(DownStore), Arc::new(SiteStatsStore::new()), feed.clone());

        let res = sink.run(futures::stream::iter(vec![Ok(reading(0, 1.0))])).await;

        assert!(matches!(res, Err(PipelineError::Store(StoreError::Unavailable(_)))));
        assert!(feed.recent_global(10).is_empty());
    }
}
