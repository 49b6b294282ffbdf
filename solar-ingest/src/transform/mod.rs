use std::sync::Arc;

use crate::pipeline::{Envelope, PipelineError, Transform};
use solar_core::{
    db::SiteRegistry,
    domain::{normalize, MeasurementKind, RawReading, Reading},
};

/// Pure normalisation of a raw reading inside an envelope.
///
/// Rules are those of [`solar_core::domain::normalize`]; `required` decides
/// which numeric fields must be present.
pub fn normalize_envelope(
    env: Envelope<RawReading>,
    required: &[MeasurementKind],
) -> Result<Envelope<Reading>, PipelineError> {
    let reading = normalize(&env.payload, required)?;
    Ok(env.map(|_| reading))
}

#[derive(Clone)]
pub struct ReadingNormalizer {
    required: Vec<MeasurementKind>,
}

impl ReadingNormalizer {
    pub fn new(required: Vec<MeasurementKind>) -> Self {
        Self { required }
    }
}

impl Default for ReadingNormalizer {
    fn default() -> Self {
        Self::new(MeasurementKind::ALL.to_vec())
    }
}

#[async_trait::async_trait]
impl Transform<RawReading, Reading> for ReadingNormalizer {
    async fn apply(&self, input: Envelope<RawReading>) -> Result<Envelope<Reading>, PipelineError> {
        match normalize_envelope(input, &self.required) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_reading_rejected_total").increment(1);
                Err(e)
            }
        }
    }
}

/// Drops readings whose site the registry does not know.
pub struct KnownSiteFilter {
    registry: Arc<dyn SiteRegistry>,
}

impl KnownSiteFilter {
    pub fn new(registry: Arc<dyn SiteRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl Transform<Reading, Reading> for KnownSiteFilter {
    async fn apply(&self, input: Envelope<Reading>) -> Result<Envelope<Reading>, PipelineError> {
        let site_id = input.payload.site_id;
        match self.registry.find_by_id(site_id).await? {
            Some(_) => Ok(input),
            None => {
                metrics::counter!("validation_unknown_site_total").increment(1);
                Err(PipelineError::UnknownSite(site_id))
            }
        }
    }
}
