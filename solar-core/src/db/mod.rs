pub mod aggregate_queries;
pub mod feed;
pub mod metric_store;
pub mod plot_queries;
pub mod site_registry;
pub mod site_stats;

use time::{Date, OffsetDateTime};

use crate::domain::{Measurement, MeasurementKind, Site, SiteId};

pub use feed::ReadingFeed;
pub use metric_store::{record_reading, MemoryMetricStore};
pub use site_registry::MemorySiteRegistry;
pub use site_stats::SiteStatsStore;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("unknown site {0}")]
    UnknownSite(SiteId),
    /// The storage medium failed. Not retried here; retry policy belongs to
    /// whoever owns the medium.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Per-minute time-series storage, partitioned by (site, UTC day, kind).
#[async_trait::async_trait]
pub trait MetricStore: Send + Sync {
    /// Create the namespace for a site so queries against it return empty
    /// series rather than [`StoreError::UnknownSite`].
    async fn ensure_site(&self, site: SiteId) -> Result<(), StoreError>;

    /// Write the value for the minute containing `timestamp`. A second write
    /// to the same (site, minute, kind) replaces the first; the replaced value
    /// is returned.
    async fn record(
        &self,
        site: SiteId,
        timestamp: OffsetDateTime,
        kind: MeasurementKind,
        value: f64,
    ) -> Result<Option<f64>, StoreError>;

    /// All minute values of one day, ascending. `None` means the current UTC day.
    async fn measurements(
        &self,
        site: SiteId,
        kind: MeasurementKind,
        day: Option<Date>,
    ) -> Result<Vec<Measurement>, StoreError>;

    /// The `limit` most recent minute values at or before `until`, ascending.
    async fn recent(
        &self,
        site: SiteId,
        kind: MeasurementKind,
        until: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<Measurement>, StoreError>;
}

#[async_trait::async_trait]
pub trait SiteRegistry: Send + Sync {
    async fn insert(&self, site: Site) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, StoreError>;
    async fn find_all(&self) -> Result<Vec<Site>, StoreError>;
}
