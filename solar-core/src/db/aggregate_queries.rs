//! Read-side aggregation over the per-minute series.
//!
//! Nothing here writes; an abandoned query simply drops its partial work.

use std::collections::BTreeMap;

use time::{Date, Time};

use super::{MetricStore, StoreError};
use crate::domain::{Combinator, Measurement, MeasurementKind, SiteId};

/// Fold minute values with the kind's combinator. `None` when there are no
/// values, so "no data" never reads as a zero total.
pub fn combine<I>(kind: MeasurementKind, values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        return None;
    }

    match kind.combinator() {
        Combinator::Sum => Some(sum),
        Combinator::Mean => Some(sum / count as f64),
    }
}

/// Total (or mean, for temperature) over the minutes observed on `day`.
/// Unobserved minutes are skipped, not counted as zero.
pub async fn daily_total<S>(
    store: &S,
    site: SiteId,
    kind: MeasurementKind,
    day: Date,
) -> Result<Option<f64>, StoreError>
where
    S: MetricStore + ?Sized,
{
    let values = store.measurements(site, kind, Some(day)).await?;
    Ok(combine(kind, values.into_iter().map(|m| m.value)))
}

/// One measurement per observed hour of `day`, stamped at the top of the hour.
pub async fn hourly_totals<S>(
    store: &S,
    site: SiteId,
    kind: MeasurementKind,
    day: Date,
) -> Result<Vec<Measurement>, StoreError>
where
    S: MetricStore + ?Sized,
{
    let values = store.measurements(site, kind, Some(day)).await?;

    let mut by_hour: BTreeMap<u8, Vec<f64>> = BTreeMap::new();
    for m in values {
        by_hour.entry(m.timestamp.hour()).or_default().push(m.value);
    }

    let hours = by_hour
        .into_iter()
        .filter_map(|(hour, vals)| {
            let value = combine(kind, vals)?;
            let start = Time::from_hms(hour, 0, 0).ok()?;
            Some(Measurement {
                timestamp: day.with_time(start).assume_utc(),
                value,
            })
        })
        .collect();

    Ok(hours)
}
