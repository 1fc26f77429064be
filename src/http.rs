// ============================================================================
// HTTP ENDPOINT
// ============================================================================
// One route, any method, uncached JSON. Every other path is a 404.
// ============================================================================

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::engine::Engine;

/// Response headers that disable every layer of caching
pub const NO_CACHE_HEADERS: [(axum::http::HeaderName, &str); 3] = [
    (CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
    (PRAGMA, "no-cache"),
    (EXPIRES, "0"),
];

/// Build the router serving statistics at the configured path.
pub fn router(engine: Arc<Engine>) -> Router {
    let path = engine.config().http.path.clone();

    Router::new()
        .route(&path, any(stats_handler))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn stats_handler(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let report = engine.serve_stats().await;
    (NO_CACHE_HEADERS, Json(report))
}

async fn not_found(uri: Uri) -> StatusCode {
    debug!(target: "pulse::http", %uri, "no route");
    StatusCode::NOT_FOUND
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PulseConfig, UpdateConfig};
    use crate::stats::StatsReport;
    use crate::testing::{BehindRemote, FakeSampler};
    use crate::update::UpdateChecker;
    use axum::body::{to_bytes, Body};
    use axum::http::{header::CONTENT_TYPE, Method, Request};
    use tower::ServiceExt;

    fn engine(dir: &std::path::Path, update: bool) -> Arc<Engine> {
        let mut config = PulseConfig::default();
        config.store.snapshot_path = dir.join("metrics.json");
        config.update = UpdateConfig {
            enabled: update,
            log_file: dir.join("update.log"),
            ..UpdateConfig::default()
        };
        let updater = UpdateChecker::with_vcs(config.update.clone(), Arc::new(BehindRemote::default()));
        Arc::new(Engine::with_parts(config, Arc::new(FakeSampler::fixed(20.0, 40.0, 60.0)), updater))
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_stats_shape_and_headers() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(dir.path(), false);
        engine.sample_cycle().await;

        let response = router(engine).oneshot(request(Method::GET, "/stats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[CACHE_CONTROL], "no-store, no-cache, must-revalidate");
        assert_eq!(headers[PRAGMA], "no-cache");
        assert_eq!(headers[EXPIRES], "0");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["cpu"]["max"], "20%");
        assert_eq!(json["ram"]["avg"], "40%");
        assert_eq!(json["disk"]["current"], "60%");
        assert_eq!(json["disk"]["growth"], "±0 GB");
        assert_eq!(json["cpu"]["count"], 1);
        assert!(json["disk"]["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_any_method_is_served() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(engine(dir.path(), false));

        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let response = app.clone().oneshot(request(method, "/stats")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_other_paths_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(engine(dir.path(), false));

        for uri in ["/", "/metrics", "/stats/extra"] {
            let response = app.clone().oneshot(request(Method::GET, uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_update_runs_cycle_before_responding() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(engine(dir.path(), true))
            .oneshot(request(Method::GET, "/stats"))
            .await
            .unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: StatsReport = serde_json::from_slice(&body).unwrap();
        assert_eq!(report.cpu.count, 1);
        assert_eq!(report.ram.count, 1);
        assert_eq!(report.disk.count, 1);
    }

    #[tokio::test]
    async fn test_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PulseConfig::default();
        config.store.snapshot_path = dir.path().join("metrics.json");
        config.http.path = "/vitals".into();
        let updater = UpdateChecker::new(config.update.clone());
        let app = router(Arc::new(Engine::with_parts(config, Arc::new(FakeSampler::default()), updater)));

        let ok = app.clone().oneshot(request(Method::GET, "/vitals")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let missing = app.oneshot(request(Method::GET, "/stats")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
