use time::Date;

use super::{MetricStore, StoreError};
use crate::domain::{minute::today, MeasurementKind, Plot, SiteId};

pub const KWH_GENERATED_LABEL: &str = "kWh Generated";
pub const KWH_USED_LABEL: &str = "kWh Used";

/// Build one plot per requested (label, kind), in the order given.
///
/// Any store error fails the whole call; a chart is never returned with a
/// series silently missing. `None` day resolves to today once, so every
/// series covers the same day.
pub async fn build_plots<S>(
    store: &S,
    site: SiteId,
    kinds: &[(&str, MeasurementKind)],
    day: Option<Date>,
) -> Result<Vec<Plot>, StoreError>
where
    S: MetricStore + ?Sized,
{
    let day = day.unwrap_or_else(today);

    let mut plots = Vec::with_capacity(kinds.len());
    for (label, kind) in kinds {
        let values = store.measurements(site, *kind, Some(day)).await?;
        plots.push(Plot::new(*label, values));
    }
    Ok(plots)
}

/// The two fixed chart series for a site: generated, then used.
pub async fn site_metrics<S>(store: &S, site: SiteId, day: Option<Date>) -> Result<Vec<Plot>, StoreError>
where
    S: MetricStore + ?Sized,
{
    build_plots(
        store,
        site,
        &[
            (KWH_GENERATED_LABEL, MeasurementKind::KwhGenerated),
            (KWH_USED_LABEL, MeasurementKind::KwhUsed),
        ],
        day,
    )
    .await
}
