use crate::{handlers, state::AppState};
use axum::{routing::get, Router};
use portwatch_core::{PortwatchConfig, PortwatchError, Result};
use std::future::Future;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))

        // Filter controls
        .route("/api/v1/ports", get(handlers::get_ports))

        // Dashboard data
        .route("/api/v1/observations", get(handlers::get_observations))
        .route("/api/v1/kpis", get(handlers::get_kpis))
        .route("/api/v1/forecast", get(handlers::get_forecast))
        .route("/api/v1/top-ports", get(handlers::get_top_ports))
        .route("/api/v1/countries", get(handlers::get_countries))
        .route("/api/v1/heatmap", get(handlers::get_heatmap))
        .route("/api/v1/quality", get(handlers::get_quality))
        .route("/api/v1/export.csv", get(handlers::export_csv))

        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub struct ApiServer {
    app: Router,
    host: String,
    port: u16,
}

impl ApiServer {
    pub fn new(config: &PortwatchConfig, state: AppState) -> Self {
        Self {
            app: router(state),
            host: config.api.host.clone(),
            port: config.api.port,
        }
    }

    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                PortwatchError::Other(format!("bind {}:{}: {}", self.host, self.port, e))
            })?;

        let addr = listener
            .local_addr()
            .map_err(|e| PortwatchError::Other(e.to_string()))?;
        info!("API server listening on {}", addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| PortwatchError::Other(e.to_string()))?;

        info!("API server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{Days, NaiveDate};
    use portwatch_core::{Dataset, Observation};
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> AppState {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut rows = Vec::new();
        for (port, country, base) in [
            ("Antwerp", "Belgium", 30.0),
            ("Busan", "South Korea", 50.0),
            ("Santos", "Brazil", 10.0),
        ] {
            for day in 0..28u64 {
                let traffic = if port == "Busan" && day == 20 { 400.0 } else { base };
                rows.push(
                    Observation::new(port, start + Days::new(day), traffic)
                        .with_country(country)
                        .with_trade(traffic * 2.0, traffic),
                );
            }
        }
        AppState::new(Dataset::new(rows), PortwatchConfig::default())
    }

    async fn fetch(uri: &str) -> (StatusCode, Value) {
        let response = router(state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = fetch("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_ports_are_sorted() {
        let (_, body) = fetch("/api/v1/ports").await;
        assert_eq!(body["data"], serde_json::json!(["Antwerp", "Busan", "Santos"]));
    }

    #[tokio::test]
    async fn test_observations_filtered_and_flagged() {
        let (status, body) =
            fetch("/api/v1/observations?ports=Busan&start=2024-01-10&end=2024-01-25&group_by_entity=true")
                .await;
        assert_eq!(status, StatusCode::OK);

        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 16);
        assert!(rows.iter().all(|r| r["PORT"] == "Busan"));

        let flagged: Vec<&str> = rows
            .iter()
            .filter(|r| r["ANOMALY"] == true)
            .map(|r| r["DATE"].as_str().unwrap())
            .collect();
        assert_eq!(flagged, vec!["2024-01-21"]);
    }

    #[tokio::test]
    async fn test_top_ports_and_countries() {
        let (_, body) = fetch("/api/v1/top-ports?n=2").await;
        let names: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Busan", "Antwerp"]);

        let (_, body) = fetch("/api/v1/countries?metric=TOTAL_EXPORT").await;
        assert_eq!(body["data"].as_array().unwrap().len(), 3);
        assert_eq!(body["data"][0]["name"], "South Korea");
    }

    #[tokio::test]
    async fn test_invalid_metric_is_bad_request() {
        let (status, body) = fetch("/api/v1/kpis?metric=CARGO").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("CARGO"));
    }

    #[tokio::test]
    async fn test_invalid_method_is_bad_request() {
        let (status, _) = fetch("/api/v1/observations?method=iqr").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_quality_for_single_port() {
        let (_, body) = fetch("/api/v1/quality?ports=Santos&start=2024-01-05&end=2024-01-12").await;
        let report = &body["data"];
        assert_eq!(report["ports_count"], 1);
        assert_eq!(report["total_rows"], 8);
        assert_eq!(report["min_date"], "2024-01-05");
        assert_eq!(report["max_date"], "2024-01-12");
    }

    #[tokio::test]
    async fn test_quality_tolerates_unknown_metric() {
        let (status, body) = fetch("/api/v1/quality?metric=CARGO").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["missing_metric_pct"].is_null());
    }

    #[tokio::test]
    async fn test_kpis() {
        let (_, body) = fetch("/api/v1/kpis?ports=Antwerp").await;
        let kpis = &body["data"];
        assert_eq!(kpis["total"], 840.0);
        assert_eq!(kpis["trend"], "sideways");
    }

    #[tokio::test]
    async fn test_forecast_outcome() {
        let (_, body) = fetch("/api/v1/forecast?ports=Santos&horizon=7").await;
        assert_eq!(body["data"]["status"], "forecast");
        assert_eq!(body["data"]["points"].as_array().unwrap().len(), 35);

        let (_, body) = fetch("/api/v1/forecast?ports=Santos&start=2024-01-01&end=2024-01-05").await;
        assert_eq!(body["data"]["status"], "insufficient_data");
    }

    #[tokio::test]
    async fn test_forecast_horizon_is_capped() {
        let (status, body) = fetch("/api/v1/forecast?ports=Santos&horizon=2000000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("2000000"));

        let (status, body) = fetch("/api/v1/forecast?ports=Santos&horizon=365").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["horizon"], 365);
    }

    #[tokio::test]
    async fn test_heatmap_grid() {
        let (status, body) =
            fetch("/api/v1/heatmap?ports=Busan,Santos&start=2024-01-01&end=2024-01-10").await;
        assert_eq!(status, StatusCode::OK);

        let heatmap = &body["data"];
        assert_eq!(heatmap["ports"], serde_json::json!(["Busan", "Santos"]));
        assert_eq!(heatmap["dates"].as_array().unwrap().len(), 10);
        let rows = heatmap["values"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.as_array().unwrap().len() == 10));
    }

    #[tokio::test]
    async fn test_export_csv() {
        let response = router(state())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/export.csv?ports=Santos")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "text/csv; charset=utf-8"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("DATE,PORT,"));
        assert_eq!(lines.count(), 28);
    }
}
