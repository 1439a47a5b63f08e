use crate::{state::AppState, ApiError, ApiResponse, ApiResult, DashboardQuery, ForecastQuery, LimitQuery};
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use portwatch_analytics::{
    kpi_summary, port_date_heatmap, quality_report, top_countries, top_entities, EntityTotal,
    Heatmap, KpiSummary, QualityReport, DEFAULT_TOP_COUNTRIES,
};
use portwatch_core::{Metric, Observation, PortwatchError};
use portwatch_forecast::ForecastOutcome;
use tracing::info;

pub async fn health_check() -> ApiResult<String> {
    Ok(Json(ApiResponse::success("OK".to_string())))
}

pub async fn get_ports(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Json(ApiResponse::success(state.dataset.ports())))
}

pub async fn get_observations(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Vec<Observation>> {
    let prepared = state.prepare(&query)?;
    Ok(Json(ApiResponse::success(
        prepared.dataset.into_observations(),
    )))
}

pub async fn get_kpis(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Option<KpiSummary>> {
    let prepared = state.prepare(&query)?;
    Ok(Json(ApiResponse::success(kpi_summary(
        &prepared.dataset,
        prepared.metric,
    ))))
}

pub async fn get_forecast(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    Query(forecast): Query<ForecastQuery>,
) -> ApiResult<ForecastOutcome> {
    let analytics = &state.config.analytics;
    let horizon = forecast.horizon.unwrap_or(analytics.forecast_horizon);
    if horizon > analytics.max_forecast_horizon {
        return Err(ApiError::bad_request(format!(
            "Forecast horizon {} exceeds the maximum of {} days",
            horizon, analytics.max_forecast_horizon
        )));
    }
    let prepared = state.prepare(&query)?;

    info!(
        rows = prepared.dataset.len(),
        metric = %prepared.metric,
        horizon,
        "Forecast requested"
    );

    Ok(Json(ApiResponse::success(portwatch_forecast::forecast(
        &prepared.dataset,
        prepared.metric,
        horizon,
    ))))
}

pub async fn get_top_ports(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    Query(limit): Query<LimitQuery>,
) -> ApiResult<Vec<EntityTotal>> {
    let prepared = state.prepare(&query)?;
    let n = limit.n.unwrap_or(state.config.analytics.top_n);
    Ok(Json(ApiResponse::success(top_entities(
        &prepared.dataset,
        prepared.metric,
        n,
    ))))
}

pub async fn get_countries(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
    Query(limit): Query<LimitQuery>,
) -> ApiResult<Vec<EntityTotal>> {
    let prepared = state.prepare(&query)?;
    let n = limit.n.unwrap_or(DEFAULT_TOP_COUNTRIES);
    Ok(Json(ApiResponse::success(top_countries(
        &prepared.dataset,
        prepared.metric,
        n,
    ))))
}

pub async fn get_heatmap(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Heatmap> {
    let prepared = state.prepare(&query)?;
    Ok(Json(ApiResponse::success(port_date_heatmap(
        &prepared.dataset,
        prepared.metric,
    ))))
}

/// Unknown metric names are reported rather than rejected.
pub async fn get_quality(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<QualityReport> {
    let selected = state.select(&query)?;
    let metric_name = query
        .metric
        .clone()
        .unwrap_or_else(|| Metric::default().column().to_string());
    Ok(Json(ApiResponse::success(quality_report(
        &selected,
        &metric_name,
    ))))
}

pub async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let prepared = state.prepare(&query)?;

    let mut body = Vec::new();
    prepared.dataset.write_csv(&mut body)?;
    let body = String::from_utf8(body).map_err(|e| PortwatchError::Other(e.to_string()))?;

    info!(rows = prepared.dataset.len(), "Exporting filtered observations");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"portwatch_export.csv\"",
            ),
        ],
        body,
    ))
}
