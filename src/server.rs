//! Web server module.
//!
//! Serves the dashboard page and the JSON query API over the stored
//! measurements and application logs.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::storage::{
    BucketedQuery, LogLevel, LogQuery, LogStore, MeasurementStore, TimeGranularity,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub measurements: MeasurementStore,
    pub logs: LogStore,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db: Option<String>,
}

/// Error payload for rejected requests.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    tracing::error!(error = %err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Query parameters for the chart data API.
#[derive(Debug, Deserialize)]
pub struct PingDataParams {
    /// Comma-separated country filter; empty means all.
    pub country: Option<String>,
    /// One of `24h`, `7d`, `30d`, `custom` (default: `24h`).
    pub range: Option<String>,
    /// RFC 3339 start, required when `range=custom`.
    pub start: Option<String>,
    /// RFC 3339 end, required when `range=custom`.
    pub end: Option<String>,
    /// Bucket width: `minute`, `hour` or `day`.
    pub granularity: Option<String>,
}

/// Query parameters for the history API.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u32>,
}

/// Query parameters for the export API.
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    /// `csv` (default) or `json`.
    pub format: Option<String>,
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Query parameters for the logs API.
#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub level: Option<String>,
    pub module: Option<String>,
    pub limit: Option<u32>,
}

/// One country's chart series: parallel timestamp and latency arrays.
#[derive(Debug, Serialize)]
struct ChartSeries {
    timestamps: Vec<String>,
    latency: Vec<Option<f64>>,
}

/// Resolve range parameters into a concrete window ending now (or at
/// the custom end).
fn resolve_range(
    range: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
    let now = Utc::now();
    match range.unwrap_or("24h") {
        "24h" => Ok((now - Duration::hours(24), now)),
        "7d" => Ok((now - Duration::days(7), now)),
        "30d" => Ok((now - Duration::days(30), now)),
        "custom" => {
            let start = start.ok_or("custom range requires 'start'")?;
            let end = end.ok_or("custom range requires 'end'")?;
            let start = DateTime::parse_from_rfc3339(start)
                .map_err(|e| format!("invalid 'start': {e}"))?
                .with_timezone(&Utc);
            let end = DateTime::parse_from_rfc3339(end)
                .map_err(|e| format!("invalid 'end': {e}"))?
                .with_timezone(&Utc);
            Ok((start, end))
        }
        other => Err(format!("invalid range '{other}'")),
    }
}

fn parse_countries(country: Option<&str>) -> Vec<String> {
    country
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

use askama::Template;

/// Dashboard template.
#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate;

/// Wrapper to render Askama templates as Axum responses.
struct HtmlTemplate<T>(T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(rendered) => Html(rendered).into_response(),
            Err(err) => {
                tracing::error!(error = %err, "Template render failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(dashboard_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/api/ping-data", get(ping_data_handler))
        .route("/api/servers/status", get(servers_status_handler))
        .route("/api/servers/{ip}/history", get(server_history_handler))
        .route("/api/export", get(export_handler))
        .route("/api/logs", get(logs_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Dashboard homepage handler.
async fn dashboard_handler() -> impl IntoResponse {
    HtmlTemplate(DashboardTemplate)
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        db: None,
    })
}

/// Readiness probe that checks database availability.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.measurements.latest_per_target().await {
        Ok(_) => Json(HealthResponse {
            status: "ok".to_string(),
            db: Some("ready".to_string()),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    db: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Chart data: per-country time series of bucketed average latency.
async fn ping_data_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PingDataParams>,
) -> Response {
    let (start, end) = match resolve_range(
        params.range.as_deref(),
        params.start.as_deref(),
        params.end.as_deref(),
    ) {
        Ok(window) => window,
        Err(msg) => return bad_request(msg),
    };

    let granularity = match params.granularity.as_deref() {
        None => TimeGranularity::default(),
        Some(g) => match g.parse::<TimeGranularity>() {
            Ok(granularity) => granularity,
            Err(_) => return bad_request(format!("invalid granularity '{g}'")),
        },
    };

    let query = BucketedQuery {
        start,
        end,
        countries: parse_countries(params.country.as_deref()),
        granularity,
    };

    let rows = match state.measurements.bucketed(&query).await {
        Ok(rows) => rows,
        Err(crate::storage::StorageError::InvalidQuery(msg)) => return bad_request(msg),
        Err(err) => return internal_error(err),
    };

    let mut series: BTreeMap<String, ChartSeries> = BTreeMap::new();
    for row in rows {
        let entry = series.entry(row.country).or_insert_with(|| ChartSeries {
            timestamps: Vec::new(),
            latency: Vec::new(),
        });
        entry.timestamps.push(row.bucket);
        entry.latency.push(row.avg_latency);
    }

    Json(series).into_response()
}

/// Latest status per monitored host, with staleness flags.
///
/// Stale targets are reported, never hidden: each one raises a warning
/// log, and a fleet that is entirely stale raises an error, but the
/// data is returned either way.
async fn servers_status_handler(State(state): State<Arc<AppState>>) -> Response {
    let statuses = match state.measurements.latest_per_target().await {
        Ok(statuses) => statuses,
        Err(err) => return internal_error(err),
    };

    for status in statuses.iter().filter(|s| s.stale) {
        state
            .logs
            .record(
                LogLevel::Warning,
                "SERVER",
                format!(
                    "no recent data for {} ({}), last check {}",
                    status.country, status.server_ip, status.last_check
                ),
                None,
            )
            .await;
    }

    if !statuses.is_empty() && statuses.iter().all(|s| s.stale) {
        state
            .logs
            .record(
                LogLevel::Error,
                "SERVER",
                "no recent ping data for any server".to_string(),
                None,
            )
            .await;
    }

    Json(statuses).into_response()
}

/// History response: the target's staleness flag plus its recent rows.
#[derive(Serialize)]
struct HistoryResponse {
    server_ip: String,
    stale: bool,
    history: Vec<crate::storage::Measurement>,
}

/// Recent measurements for one host, newest first.
async fn server_history_handler(
    State(state): State<Arc<AppState>>,
    Path(ip): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Response {
    match state.measurements.history(&ip, params.limit).await {
        Ok(history) if history.is_empty() => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no measurements for '{ip}'"),
            }),
        )
            .into_response(),
        Ok(history) => {
            // Rows come back newest first.
            let stale = crate::storage::is_stale(history[0].ts, Utc::now());
            Json(HistoryResponse {
                server_ip: ip,
                stale,
                history,
            })
            .into_response()
        }
        Err(err) => internal_error(err),
    }
}

/// Export raw measurements for a time window as CSV or JSON.
async fn export_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportParams>,
) -> Response {
    let (start, end) = match resolve_range(
        params.range.as_deref(),
        params.start.as_deref(),
        params.end.as_deref(),
    ) {
        Ok(window) => window,
        Err(msg) => return bad_request(msg),
    };

    let rows = match state.measurements.export(start, end).await {
        Ok(rows) => rows,
        Err(crate::storage::StorageError::InvalidQuery(msg)) => return bad_request(msg),
        Err(err) => return internal_error(err),
    };

    match params.format.as_deref().unwrap_or("csv") {
        "json" => Json(rows).into_response(),
        "csv" => {
            let mut csv = String::from(
                "ts,server_ip,country,partner,dn_ext,packets_transmitted,packets_received,\
                 packets_lost,loss_percentage,min_time,avg_time,max_time,mdev_time,\
                 is_high_latency,success\n",
            );
            for row in &rows {
                csv.push_str(&format!(
                    "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
                    row.ts.to_rfc3339(),
                    row.server_ip,
                    row.country,
                    row.partner,
                    row.dn_ext,
                    row.packets_transmitted,
                    row.packets_received,
                    row.packets_lost,
                    row.loss_percentage,
                    fmt_opt(row.min_time),
                    fmt_opt(row.avg_time),
                    fmt_opt(row.max_time),
                    fmt_opt(row.mdev_time),
                    row.is_high_latency,
                    row.success,
                ));
            }
            (
                [
                    ("content-type", "text/csv"),
                    (
                        "content-disposition",
                        "attachment; filename=\"ping_export.csv\"",
                    ),
                ],
                csv,
            )
                .into_response()
        }
        other => bad_request(format!("invalid format '{other}'")),
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Application log query endpoint.
async fn logs_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogsParams>,
) -> Response {
    let level = match params.level.as_deref() {
        None => None,
        Some(l) => match l.parse::<LogLevel>() {
            Ok(level) => Some(level),
            Err(_) => return bad_request(format!("invalid level '{l}'")),
        },
    };

    let query = LogQuery {
        level,
        module: params.module.filter(|m| !m.is_empty()),
        limit: params.limit,
    };

    match state.logs.query(&query).await {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => internal_error(err),
    }
}
