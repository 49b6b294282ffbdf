use anyhow::{bail, Result};
use solar_core::{
    db::{aggregate_queries, MemoryMetricStore, MemorySiteRegistry, ReadingFeed, SiteStatsStore},
    domain::{MeasurementKind, RawReading, Reading},
};
use solar_ingest::{
    config::AppConfig,
    observability,
    pipeline::{Pipeline, Sink, Source, Transform},
    registry,
    sinks::MetricStoreSink,
    sources::{ReadingCsvFileSource, ReadingNdjsonFileSource},
    transform::{KnownSiteFilter, ReadingNormalizer},
};
use std::{env, path::Path, sync::Arc};

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct DailyRow {
    site_id: i64,
    day: String,
    readings: u64,
    wh_generated: Option<f64>,
    wh_used: Option<f64>,
    net_wh: Option<f64>,
    mean_temp_c: Option<f64>,
}

async fn run_pipeline<S, K>(source: S, cfg: &AppConfig, sites: Arc<MemorySiteRegistry>, sink: K) -> Result<()>
where
    S: Source<RawReading> + 'static,
    K: Sink<Reading> + 'static,
{
    let transforms: Vec<Arc<dyn Transform<Reading, Reading> + Send + Sync>> =
        vec![Arc::new(KnownSiteFilter::new(sites))];
    let pipeline: Pipeline<_, RawReading, Reading, _> = Pipeline {
        source,
        normalize: Arc::new(ReadingNormalizer::new(cfg.pipeline.required_kinds.clone())),
        transforms,
        sink,
    };
    pipeline.run().await?;
    Ok(())
}

/// Replays a reading file (NDJSON, CSV or pipe-delimited `.dat`) through the
/// normal pipeline into an in-memory store, then prints one JSON line of
/// daily totals per site and day.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: backfill_report <readings.ndjson|readings.csv|readings.dat>");
    }
    let file_path = &args[1];

    // Sites and required kinds come from the usual config file.
    let cfg = AppConfig::load()?;

    let store = Arc::new(MemoryMetricStore::new());
    let sites = Arc::new(MemorySiteRegistry::new());
    let stats = Arc::new(SiteStatsStore::new());
    let feed = Arc::new(ReadingFeed::new(cfg.feed.global_max_len, cfg.feed.site_max_len));

    registry::seed_sites(sites.as_ref(), store.as_ref(), &cfg.sites).await?;

    let sink = MetricStoreSink::new(store.clone(), stats.clone(), feed);
    let extension = Path::new(file_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match extension.as_str() {
        "ndjson" | "jsonl" => run_pipeline(ReadingNdjsonFileSource::new(file_path), &cfg, sites, sink).await?,
        "csv" => run_pipeline(ReadingCsvFileSource::new(file_path), &cfg, sites, sink).await?,
        "dat" => {
            let source = ReadingCsvFileSource::new(file_path).with_delimiter(b'|');
            run_pipeline(source, &cfg, sites, sink).await?
        }
        other => bail!("unsupported file extension '{other}'"),
    }

    let site_days = stats.site_days();
    for (site, day) in &site_days {
        let generated = aggregate_queries::daily_total(store.as_ref(), *site, MeasurementKind::KwhGenerated, *day).await?;
        let used = aggregate_queries::daily_total(store.as_ref(), *site, MeasurementKind::KwhUsed, *day).await?;
        let temp = aggregate_queries::daily_total(store.as_ref(), *site, MeasurementKind::TemperatureCelsius, *day).await?;

        let row = DailyRow {
            site_id: site.0,
            day: day.to_string(),
            readings: stats.find(*site, *day).map_or(0, |s| s.meter_reading_count),
            wh_generated: generated,
            wh_used: used,
            net_wh: generated.zip(used).map(|(g, u)| g - u),
            mean_temp_c: temp,
        };
        println!("{}", serde_json::to_string(&row)?);
    }

    let values = store.stats().value_count;
    tracing::info!(site_days = site_days.len(), minute_values = values, "backfill report complete");

    Ok(())
}
