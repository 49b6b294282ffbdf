use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use solar_core::{
    db::SiteRegistry,
    domain::{normalize, MeasurementKind, RawReading, SiteId},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

#[derive(Clone)]
struct IngestState {
    tx: mpsc::Sender<Envelope<RawReading>>,
    registry: Arc<dyn SiteRegistry>,
    required: Arc<[MeasurementKind]>,
    max_request_records: usize,
}

/// `POST /meterReadings` feeding raw readings into the pipeline.
///
/// A batch is pre-checked with the same normaliser the pipeline runs and
/// against the site registry. An invalid record refuses the whole batch with
/// 400, a record for an unregistered site with 404; either way nothing is
/// enqueued.
#[derive(Clone)]
pub struct HttpReadingSource {
    receiver: Arc<tokio::sync::Mutex<Option<mpsc::Receiver<Envelope<RawReading>>>>>,
}

#[derive(serde::Serialize)]
struct RejectedBody {
    error: String,
    index: usize,
}

impl HttpReadingSource {
    /// Build the source and the router that feeds it, without binding.
    pub fn with_router(
        registry: Arc<dyn SiteRegistry>,
        channel_capacity: usize,
        required: Vec<MeasurementKind>,
        max_body_bytes: usize,
        max_request_records: usize,
    ) -> (Self, Router) {
        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let state = IngestState {
            tx,
            registry,
            required: required.into(),
            max_request_records,
        };

        let app = Router::new()
            .route("/meterReadings", post(ingest_readings))
            .layer(DefaultBodyLimit::max(max_body_bytes))
            .with_state(state);

        let source = Self {
            receiver: Arc::new(tokio::sync::Mutex::new(Some(rx))),
        };
        (source, app)
    }

    /// Bind `bind_addr` and serve the ingestion route. A bind failure is
    /// returned here rather than leaving a source that never yields.
    pub async fn new(
        bind_addr: &str,
        registry: Arc<dyn SiteRegistry>,
        channel_capacity: usize,
        required: Vec<MeasurementKind>,
        max_body_bytes: usize,
        max_request_records: usize,
    ) -> Result<Self, PipelineError> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| PipelineError::Source(format!("invalid bind addr: {e}")))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| PipelineError::Source(format!("failed to bind {addr}: {e}")))?;

        let (source, app) = Self::with_router(registry, channel_capacity, required, max_body_bytes, max_request_records);

        tracing::info!(%addr, "reading ingestion listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                tracing::error!(error = %e, "HTTP reading source server error");
            }
        });

        Ok(source)
    }
}

#[async_trait::async_trait]
impl Source<RawReading> for HttpReadingSource {
    async fn stream(&self) -> EnvelopeStream<RawReading> {
        let mut guard = self.receiver.lock().await;
        match guard.take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx).map(Ok)),
            None => Box::pin(futures::stream::once(async {
                Err(PipelineError::Source(
                    "HttpReadingSource stream already taken; only one consumer supported".to_string(),
                ))
            })),
        }
    }
}

fn rejected(status: StatusCode, error: String, index: usize) -> Response {
    (status, Json(RejectedBody { error, index })).into_response()
}

fn unknown_site_message(site: SiteId) -> String {
    format!("unknown site {site}")
}

async fn ingest_readings(
    State(state): State<IngestState>,
    Json(payload): Json<Vec<RawReading>>,
) -> Response {
    metrics::counter!("http_ingest_requests_total").increment(1);

    if payload.len() > state.max_request_records {
        metrics::counter!("http_ingest_rejected_total").increment(1);
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(serde_json::json!({
                "error": format!("at most {} readings per request", state.max_request_records)
            })),
        )
            .into_response();
    }

    for (index, raw) in payload.iter().enumerate() {
        let reading = match normalize(raw, &state.required) {
            Ok(reading) => reading,
            Err(reason) => {
                metrics::counter!("http_ingest_rejected_total").increment(1);
                tracing::warn!(index, error = %reason, "rejected reading batch");
                return rejected(StatusCode::BAD_REQUEST, reason.to_string(), index);
            }
        };

        match state.registry.find_by_id(reading.site_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                metrics::counter!("http_ingest_unknown_site_total").increment(1);
                tracing::warn!(index, site_id = %reading.site_id, "reading batch for unregistered site");
                return rejected(StatusCode::NOT_FOUND, unknown_site_message(reading.site_id), index);
            }
            Err(e) => {
                metrics::counter!("http_ingest_failed_total").increment(1);
                tracing::error!(error = %e, "site registry lookup failed");
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
        }
    }

    let count = payload.len();
    for raw in payload {
        if state.tx.send(Envelope::now(raw)).await.is_err() {
            // Channel closed; treat as server error
            metrics::counter!("http_ingest_failed_total").increment(1);
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    metrics::counter!("http_ingest_readings_total").increment(count as u64);
    StatusCode::ACCEPTED.into_response()
}
