use anyhow::Result;
use solar_core::{
    db::{MemoryMetricStore, MemorySiteRegistry, MetricStore, ReadingFeed, SiteRegistry, SiteStatsStore},
    domain::{RawReading, Reading},
};
use solar_ingest::{
    api::{self, AppState},
    config::AppConfig,
    metrics_server, observability,
    pipeline::Pipeline,
    registry,
    sinks::MetricStoreSink,
    sources::HttpReadingSource,
    transform::{KnownSiteFilter, ReadingNormalizer},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let store: Arc<dyn MetricStore> = Arc::new(MemoryMetricStore::new());
    let sites: Arc<dyn SiteRegistry> = Arc::new(MemorySiteRegistry::new());
    let stats = Arc::new(SiteStatsStore::new());
    let feed = Arc::new(ReadingFeed::new(cfg.feed.global_max_len, cfg.feed.site_max_len));

    registry::seed_sites(sites.as_ref(), store.as_ref(), &cfg.sites).await?;

    // Ingestion pipeline
    let source = HttpReadingSource::new(
        &cfg.ingest.http_bind_addr,
        sites.clone(),
        cfg.ingest.channel_capacity,
        cfg.pipeline.required_kinds.clone(),
        cfg.ingest.max_body_bytes,
        cfg.ingest.max_request_records,
    )
    .await?;
    let pipeline: Pipeline<_, RawReading, Reading, _> = Pipeline {
        source,
        normalize: Arc::new(ReadingNormalizer::new(cfg.pipeline.required_kinds.clone())),
        transforms: vec![Arc::new(KnownSiteFilter::new(sites.clone()))],
        sink: MetricStoreSink::new(store.clone(), stats.clone(), feed.clone()),
    };

    let state = AppState { store, stats, feed };

    // A stopped pipeline leaves ingestion answering 503; queries keep being served.
    let ingestion = tokio::spawn(async move {
        match pipeline.run().await {
            Ok(()) => tracing::warn!("ingestion pipeline ended"),
            Err(e) => tracing::error!(error = %e, "ingestion pipeline stopped"),
        }
    });

    let served = api::serve(&cfg.api.bind_addr, state).await;
    ingestion.abort();
    served
}
