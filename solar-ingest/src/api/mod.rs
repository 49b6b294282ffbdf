//! Read-side HTTP API: chart plots, daily/hourly totals, most recent minute
//! values, recent readings, site stats and health. Cross-origin access is open.

pub mod error;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use solar_core::{
    db::{aggregate_queries, plot_queries, MetricStore, ReadingFeed, SiteStatsStore},
    domain::{minute::today, Measurement, MeasurementKind, Plot, Reading, SiteId, SiteStats},
};
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use tower_http::cors::CorsLayer;

use crate::health::{self, HealthStatus};
pub use error::ApiError;

pub const DEFAULT_FEED_LIMIT: usize = 100;
pub const MAX_FEED_LIMIT: usize = 1_000;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetricStore>,
    pub stats: Arc<SiteStatsStore>,
    pub feed: Arc<ReadingFeed>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics/:site_id", get(site_metrics))
        .route("/metrics/:site_id/daily", get(daily_total))
        .route("/metrics/:site_id/hourly", get(hourly_totals))
        .route("/metrics/:site_id/recent", get(recent_values))
        .route("/meterReadings", get(recent_global))
        .route("/meterReadings/:site_id", get(recent_for_site))
        .route("/sites/:site_id/stats", get(site_stats))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid api.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "query API listening");
    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct DayQuery {
    day: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KindDayQuery {
    kind: MeasurementKind,
    day: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    kind: MeasurementKind,
    until: Option<String>,
    n: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    n: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DailyTotalResponse {
    site_id: SiteId,
    kind: MeasurementKind,
    day: String,
    total: Option<f64>,
}

fn parse_day(day: Option<&str>) -> Result<Date, ApiError> {
    match day {
        None => Ok(today()),
        Some(s) => Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
            .map_err(|_| ApiError::InvalidDay(s.to_string())),
    }
}

fn parse_until(until: Option<&str>) -> Result<OffsetDateTime, ApiError> {
    match until {
        None => Ok(OffsetDateTime::now_utc()),
        Some(s) => OffsetDateTime::parse(s.trim(), &Rfc3339).map_err(|_| ApiError::InvalidInstant(s.to_string())),
    }
}

fn format_day(day: Date) -> String {
    day.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| day.to_string())
}

fn feed_limit(n: Option<usize>) -> usize {
    n.unwrap_or(DEFAULT_FEED_LIMIT).min(MAX_FEED_LIMIT)
}

async fn site_metrics(
    State(state): State<AppState>,
    Path(site_id): Path<i64>,
    Query(q): Query<DayQuery>,
) -> error::Result<Json<Vec<Plot>>> {
    let day = parse_day(q.day.as_deref())?;
    let plots = plot_queries::site_metrics(state.store.as_ref(), SiteId(site_id), Some(day)).await?;
    Ok(Json(plots))
}

async fn daily_total(
    State(state): State<AppState>,
    Path(site_id): Path<i64>,
    Query(q): Query<KindDayQuery>,
) -> error::Result<Json<DailyTotalResponse>> {
    let day = parse_day(q.day.as_deref())?;
    let total = aggregate_queries::daily_total(state.store.as_ref(), SiteId(site_id), q.kind, day).await?;
    Ok(Json(DailyTotalResponse {
        site_id: SiteId(site_id),
        kind: q.kind,
        day: format_day(day),
        total,
    }))
}

async fn hourly_totals(
    State(state): State<AppState>,
    Path(site_id): Path<i64>,
    Query(q): Query<KindDayQuery>,
) -> error::Result<Json<Vec<Measurement>>> {
    let day = parse_day(q.day.as_deref())?;
    let hours = aggregate_queries::hourly_totals(state.store.as_ref(), SiteId(site_id), q.kind, day).await?;
    Ok(Json(hours))
}

async fn recent_values(
    State(state): State<AppState>,
    Path(site_id): Path<i64>,
    Query(q): Query<RecentQuery>,
) -> error::Result<Json<Vec<Measurement>>> {
    let until = parse_until(q.until.as_deref())?;
    let values = state
        .store
        .recent(SiteId(site_id), q.kind, until, feed_limit(q.n))
        .await?;
    Ok(Json(values))
}

async fn recent_global(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Json<Vec<Reading>> {
    Json(state.feed.recent_global(feed_limit(q.n)))
}

async fn recent_for_site(
    State(state): State<AppState>,
    Path(site_id): Path<i64>,
    Query(q): Query<FeedQuery>,
) -> Json<Vec<Reading>> {
    Json(state.feed.recent_for_site(SiteId(site_id), feed_limit(q.n)))
}

async fn site_stats(
    State(state): State<AppState>,
    Path(site_id): Path<i64>,
    Query(q): Query<DayQuery>,
) -> error::Result<Json<SiteStats>> {
    let day = parse_day(q.day.as_deref())?;
    state
        .stats
        .find(SiteId(site_id), day)
        .map(Json)
        .ok_or_else(|| ApiError::StatsNotFound {
            site: SiteId(site_id),
            day: format_day(day),
        })
}

async fn health_check() -> Json<HealthStatus> {
    Json(health::probe())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use solar_core::db::MemoryMetricStore;
    use time::macros::datetime;
    use tower::ServiceExt;

    async fn state() -> AppState {
        let store = Arc::new(MemoryMetricStore::new());
        for (ts, gen, used) in [
            (datetime!(2024-01-01 00:00:00 UTC), 1.5, 0.8),
            (datetime!(2024-01-01 00:01:00 UTC), 2.0, 1.0),
        ] {
            store
                .record(SiteId(42), ts, MeasurementKind::KwhGenerated, gen)
                .await
                .unwrap();
            store.record(SiteId(42), ts, MeasurementKind::KwhUsed, used).await.unwrap();
        }
        store.ensure_site(SiteId(7)).await.unwrap();

        AppState {
            store,
            stats: Arc::new(SiteStatsStore::new()),
            feed: Arc::new(ReadingFeed::default()),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn site_metrics_returns_two_named_plots() {
        let app = router(state().await);
        let (status, body) = get_json(app, "/metrics/42?day=2024-01-01").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "kWh Generated");
        assert_eq!(body[1]["name"], "kWh Used");
        assert_eq!(body[0]["values"][0]["timestamp"], "2024-01-01T00:00:00Z");
        assert_eq!(body[0]["values"][1]["value"], 2.0);
    }

    #[tokio::test]
    async fn unknown_site_is_not_found_with_no_plots() {
        let app = router(state().await);
        let (status, body) = get_json(app, "/metrics/999?day=2024-01-01").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.get("error").is_some());
        assert!(!body.is_array());
    }

    #[tokio::test]
    async fn known_site_without_data_gets_empty_series() {
        let app = router(state().await);
        let (status, body) = get_json(app, "/metrics/7?day=2024-01-01").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["values"].as_array().unwrap().len(), 0);
        assert_eq!(body[1]["values"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn daily_total_reports_sum_and_null_for_no_data() {
        let app = router(state().await);
        let (status, body) = get_json(app.clone(), "/metrics/42/daily?kind=kwh_generated&day=2024-01-01").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3.5);
        assert_eq!(body["day"], "2024-01-01");

        let (_, body) = get_json(app, "/metrics/42/daily?kind=temperature_celsius&day=2024-01-01").await;
        assert!(body["total"].is_null());
    }

    #[tokio::test]
    async fn recent_values_walk_back_from_until() {
        let app = router(state().await);
        let (status, body) = get_json(
            app.clone(),
            "/metrics/42/recent?kind=kwh_used&until=2024-01-01T00:05:00Z&n=1",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let values = body.as_array().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["timestamp"], "2024-01-01T00:01:00Z");
        assert_eq!(values[0]["value"], 1.0);

        let (status, _) = get_json(app.clone(), "/metrics/42/recent?kind=kwh_used&until=noon").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(app, "/metrics/999/recent?kind=kwh_used").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_day_is_bad_request() {
        let app = router(state().await);
        let (status, _) = get_json(app, "/metrics/42?day=yesterday").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_stats_is_not_found() {
        let app = router(state().await);
        let (status, _) = get_json(app, "/sites/42/stats?day=2024-01-01").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn responses_allow_any_origin() {
        let app = router(state().await);
        let res = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("origin", "http://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
    }
}
