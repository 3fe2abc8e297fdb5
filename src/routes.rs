//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod health;
mod history;
mod model;
mod presets;
mod report;
mod swap;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    extract::State,
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Model session
        .route("/model/open", post(model::open_model))
        .route("/connections", get(model::get_connections))
        .route("/validate", post(model::validate))

        // Swapping
        .route("/swap", post(swap::swap))
        .route("/rollback", post(swap::rollback))

        // Target health
        .route("/health/targets", get(health::list_targets).post(health::register_target))
        .route("/health/targets/{key}", delete(health::unregister_target))
        .route("/health/check", post(health::check_now))

        // Presets
        .route("/presets", get(presets::list_presets).post(presets::save_preset))
        .route("/presets/{name}", delete(presets::delete_preset))
        .route("/presets/{name}/apply", post(presets::apply_preset))

        // History
        .route("/history", get(history::list_history))
        .route("/history/{batch_id}", get(history::get_batch))

        // Reports and host processes
        .route("/report/swap", post(report::swap_report))
        .route("/report/restore", post(report::restore_report))
        .route("/process/terminate", post(report::terminate_process))

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }
}

/// Liveness endpoint; also reports the open model and the health loop
async fn health_check(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    let model = state
        .session
        .lock()
        .await
        .as_ref()
        .map(|s| s.path.display().to_string());

    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "openModel": model,
        "healthLoopRunning": state.health.is_running().await
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SwapTarget;
    use crate::state::AppState;
    use crate::tabular::bim::tests::sample_document;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const CLOUD_SERVER: &str = "powerbi://api.powerbi.com/v1.0/myorg/Sales";

    async fn test_app(dir: &tempfile::TempDir) -> (Router, std::path::PathBuf) {
        let model_path = dir.path().join("model.bim");
        std::fs::write(&model_path, serde_json::to_vec(&sample_document()).unwrap()).unwrap();

        let mut settings = Settings::default();
        settings.engine.data_dir = dir.path().join("data");
        let state = Arc::new(AppState::new(&settings).await);
        (create_router(state, &settings), model_path)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn open(app: &Router, path: &std::path::Path) {
        let (status, body) = call(
            app,
            "POST",
            "/model/open",
            Some(json!({ "path": path.display().to_string(), "server": "localhost:52700" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(&dir).await;

        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["openModel"], Value::Null);
    }

    #[tokio::test]
    async fn test_connections_require_open_model() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = test_app(&dir).await;

        let (status, body) = call(&app, "GET", "/connections", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "NOT_CONNECTED");
    }

    #[tokio::test]
    async fn test_open_swap_and_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let (app, model_path) = test_app(&dir).await;
        open(&app, &model_path).await;

        let (_, body) = call(&app, "GET", "/connections", None).await;
        assert_eq!(body["data"]["info"]["modelName"], "Sales");

        let target = serde_json::to_value(SwapTarget::cloud(CLOUD_SERVER, "SalesModel")).unwrap();
        let (status, body) = call(
            &app,
            "POST",
            "/swap",
            Some(json!({ "mappings": [{ "connectionName": "Warehouse", "target": target }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["succeeded"], 1);

        let on_disk = std::fs::read_to_string(&model_path).unwrap();
        assert!(on_disk.contains(CLOUD_SERVER));

        let (status, body) = call(
            &app,
            "POST",
            "/rollback",
            Some(json!({ "connectionName": "Warehouse" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["succeeded"], 1);

        let on_disk = std::fs::read_to_string(&model_path).unwrap();
        assert!(on_disk.contains("localhost:52700"));

        let (_, body) = call(&app, "GET", "/history", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_connection_is_rejected_before_swapping() {
        let dir = tempfile::tempdir().unwrap();
        let (app, model_path) = test_app(&dir).await;
        open(&app, &model_path).await;
        let before = std::fs::read_to_string(&model_path).unwrap();

        let target = serde_json::to_value(SwapTarget::cloud(CLOUD_SERVER, "SalesModel")).unwrap();
        let (status, _) = call(
            &app,
            "POST",
            "/swap",
            Some(json!({ "mappings": [
                { "connectionName": "Warehouse", "target": target },
                { "connectionName": "Missing", "target": target }
            ] })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(std::fs::read_to_string(&model_path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_failing_target_needs_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let (app, model_path) = test_app(&dir).await;
        open(&app, &model_path).await;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let target = serde_json::to_value(SwapTarget::local(format!("127.0.0.1:{}", port), "Sales")).unwrap();

        let (status, _) = call(&app, "POST", "/health/targets", Some(target.clone())).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, "POST", "/health/check", Some(json!({}))).await;
        assert_eq!(body["data"][0]["status"], "unhealthy");

        let swap = |confirm: bool| {
            json!({ "mappings": [{ "connectionName": "Warehouse", "target": target }], "confirm": confirm })
        };
        let (status, body) = call(&app, "POST", "/swap", Some(swap(false))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "CONFLICT");

        let (status, body) = call(&app, "POST", "/swap", Some(swap(true))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["succeeded"], 1);
    }

    #[tokio::test]
    async fn test_global_preset_applies_to_single_live_connection() {
        let dir = tempfile::tempdir().unwrap();
        let (app, model_path) = test_app(&dir).await;
        open(&app, &model_path).await;

        let target = serde_json::to_value(SwapTarget::cloud(CLOUD_SERVER, "SalesModel")).unwrap();
        let (status, body) = call(
            &app,
            "POST",
            "/presets",
            Some(json!({
                "name": "to-cloud",
                "scope": "global",
                "mappings": [{ "connectionName": "*", "target": target }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);

        let (_, body) = call(&app, "GET", "/presets", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, "POST", "/presets/to-cloud/apply", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["succeeded"], 1);

        let (status, _) = call(&app, "DELETE", "/presets/to-cloud", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "DELETE", "/presets/to-cloud", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_model_presets_survive_swap_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (app, model_path) = test_app(&dir).await;
        open(&app, &model_path).await;

        for (name, catalog) in [("prod", "SalesProd"), ("dev", "SalesDev")] {
            let target = serde_json::to_value(SwapTarget::cloud(CLOUD_SERVER, catalog)).unwrap();
            let (status, body) = call(
                &app,
                "POST",
                "/presets",
                Some(json!({
                    "name": name,
                    "scope": "model",
                    "mappings": [{ "connectionName": "Warehouse", "target": target }]
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{}", body);
        }

        let (status, body) = call(&app, "POST", "/presets/prod/apply", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["succeeded"], 1);

        open(&app, &model_path).await;
        let (status, body) = call(&app, "POST", "/presets/dev/apply", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["succeeded"], 1);
    }
}
