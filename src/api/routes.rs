//! Router construction and server bootstrap.

use std::sync::Arc;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cm::CmRegistry;
use crate::config::Config;
use crate::datasets::{DatasetCatalog, DatasetServerClient};
use crate::task::{create_task_store, ArtifactStore, ExecutionPool, TaskDispatcher, TaskStore};

use super::cm as cm_api;
use super::datasets as datasets_api;
use super::types::HealthResponse;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Registered calculation modules
    pub registry: Arc<CmRegistry>,
    /// Task lifecycle orchestrator
    pub dispatcher: Arc<TaskDispatcher>,
    /// Dataset inventory
    pub catalog: Arc<DatasetCatalog>,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = build_state(config).await?;
    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let mut catalog = DatasetCatalog::embedded()?;

    // Optional remote enrichment; an unreachable server is not fatal.
    if let (Some(url), Some(key)) = (
        config.datasets_server_url.as_deref(),
        config.datasets_server_api_key.as_deref(),
    ) {
        match DatasetServerClient::new(url, key) {
            Ok(client) => match client.fetch_datasets().await {
                Ok(remote) => {
                    tracing::info!(count = remote.len(), "merged remote dataset metadata");
                    catalog.merge(remote);
                }
                Err(e) => {
                    tracing::warn!("dataset server unavailable, keeping embedded catalog: {}", e)
                }
            },
            Err(e) => {
                tracing::warn!("dataset server misconfigured, keeping embedded catalog: {}", e)
            }
        }
    }
    let catalog = Arc::new(catalog);

    let registry = Arc::new(CmRegistry::with_default_modules(Arc::clone(&catalog))?);
    tracing::info!(count = registry.list().len(), "calculation modules registered");

    let store: Arc<dyn TaskStore> =
        Arc::from(create_task_store(config.task_store, &config.data_dir).await?);
    if store.is_persistent() {
        tracing::info!("task store: sqlite under {}", config.data_dir.display());
    }
    let artifacts = ArtifactStore::new(config.data_dir.join("artifacts"))?;
    let pool = ExecutionPool::new(config.workers);
    tracing::info!(workers = pool.width(), "execution pool ready");

    let dispatcher = Arc::new(TaskDispatcher::new(
        Arc::clone(&registry),
        store,
        artifacts,
        pool,
    ));

    if let Some(hours) = config.task_retention_hours {
        dispatcher.start_retention_sweep(std::time::Duration::from_secs(hours * 3600));
    }

    Ok(Arc::new(AppState {
        config,
        registry,
        dispatcher,
        catalog,
    }))
}

/// The legacy route table. Trailing slashes are part of the public surface.
fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/cm/", get(cm_api::list_cms))
        .route("/api/cm/:name/task/", post(cm_api::submit_task))
        .route(
            "/api/cm/:name/task/:task_id/",
            get(cm_api::get_task).delete(cm_api::delete_task),
        )
        .route(
            "/api/cm/:name/task/:task_id/download/",
            get(cm_api::download_task),
        )
        .route("/api/datasets/", get(datasets_api::list_datasets))
        .route("/api/datasets/areas/", get(datasets_api::list_areas))
        .route(
            "/api/datasets/layer_name/:id/",
            get(datasets_api::layer_name),
        )
        .route("/api/datasets/legend/*layer_name", get(datasets_api::legend))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    async fn test_app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());
        let state = build_state(config).await.unwrap();
        (router(state), dir)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn head_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::HEAD)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn delete_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::DELETE)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(
        app: &Router,
        request: Request<Body>,
    ) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    fn as_json(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    fn buildingload_params() -> Value {
        json!({
            "gross floor area": 100.0,
            "number of stories": 1,
            "building type": "SFH",
            "construction year": 1990,
            "heated share": 0.8,
        })
    }

    async fn submit(app: &Router, cm: &str, params: Value) -> String {
        let (status, _, body) = send(app, post_json(&format!("/api/cm/{}/task/", cm), params)).await;
        assert_eq!(status, StatusCode::OK, "submit failed: {:?}", body);
        as_json(&body)["task_id"].as_str().unwrap().to_string()
    }

    async fn wait_success(app: &Router, cm: &str, task_id: &str) -> Value {
        for _ in 0..400 {
            let (status, _, body) =
                send(app, get_req(&format!("/api/cm/{}/task/{}/", cm, task_id))).await;
            assert_eq!(status, StatusCode::OK);
            let snapshot = as_json(&body);
            match snapshot["status"].as_str() {
                Some("success") => return snapshot,
                Some("failed") => panic!("task failed: {:?}", snapshot["error"]),
                _ => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
            }
        }
        panic!("task {} never completed", task_id);
    }

    #[tokio::test]
    async fn test_health_reports_version() {
        let (app, _dir) = test_app().await;
        let (status, _, body) = send(&app, get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        let body = as_json(&body);
        assert_eq!(body["status"], "ok");
        assert!(!body["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cm_list_carries_schemas() {
        let (app, _dir) = test_app().await;
        let (status, _, body) = send(&app, get_req("/api/cm/")).await;
        assert_eq!(status, StatusCode::OK);
        let cms = as_json(&body)["cms"].as_array().unwrap().clone();
        assert_eq!(cms.len(), 3);
        assert_eq!(cms[0]["name"], "cm_buildingload");
        for cm in &cms {
            assert!(cm["schema"]["properties"].is_object());
            assert!(!cm["pretty_name"].as_str().unwrap().is_empty());
        }

        // The trailing slash is part of the legacy surface.
        let (status, _, _) = send(&app, get_req("/api/cm")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_task_lifecycle_over_http() {
        let (app, _dir) = test_app().await;

        let task_id = submit(&app, "cm_buildingload", buildingload_params()).await;
        let snapshot = wait_success(&app, "cm_buildingload", &task_id).await;
        assert_eq!(snapshot["cm_name"], "cm_buildingload");
        assert_eq!(
            snapshot["result"]["values"]["Yearly heat demand (MWh)"],
            9.6
        );
        assert_eq!(snapshot["download_available"], true);
        assert!(snapshot["error"].is_null());

        let download_uri = format!("/api/cm/cm_buildingload/task/{}/download/", task_id);

        let (status, headers, body) = send(&app, get_req(&download_uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/csv");
        assert!(headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("monthly_load_profile.csv"));
        assert!(headers.contains_key(header::ETAG));
        assert!(body.starts_with(b"month,heat_demand_kwh"));

        let (status, headers, body) = send(&app, head_req(&download_uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_LENGTH].to_str().unwrap() != "0");
        assert!(body.is_empty());

        let (status, _, body) = send(
            &app,
            delete_req(&format!("/api/cm/cm_buildingload/task/{}/", task_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = as_json(&body);
        assert_eq!(body["deleted"], true);
        assert_eq!(body["task_id"], task_id.as_str());

        let (status, _, _) = send(
            &app,
            get_req(&format!("/api/cm/cm_buildingload/task/{}/", task_id)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(
            &app,
            delete_req(&format!("/api/cm/cm_buildingload/task/{}/", task_id)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_schema_violations_list_fields() {
        let (app, _dir) = test_app().await;

        let mut params = buildingload_params();
        params["building type"] = json!("IGLOO");
        let (status, _, body) = send(
            &app,
            post_json("/api/cm/cm_buildingload/task/", params),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body = as_json(&body);
        assert!(body["message"].as_str().unwrap().contains("violation"));
        let fields = body["fields"].as_array().unwrap();
        assert!(fields.iter().any(|f| f["field"] == "building type"));
    }

    #[tokio::test]
    async fn test_unknown_cm_is_not_found() {
        let (app, _dir) = test_app().await;
        let (status, _, _) = send(&app, post_json("/api/cm/cm_nope/task/", json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_task_routes_validate_owning_cm() {
        let (app, _dir) = test_app().await;
        let task_id = submit(&app, "cm_buildingload", buildingload_params()).await;

        let (status, _, _) = send(
            &app,
            get_req(&format!("/api/cm/multiply_raster/task/{}/", task_id)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // The task still exists under its own CM.
        let (status, _, _) = send(
            &app,
            get_req(&format!("/api/cm/cm_buildingload/task/{}/", task_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_download_without_artifact_is_not_found() {
        let (app, _dir) = test_app().await;

        let task_id = submit(
            &app,
            "multiply_raster",
            json!({"factor": 2, "dataset": "heat_density_total"}),
        )
        .await;
        wait_success(&app, "multiply_raster", &task_id).await;

        let download_uri = format!("/api/cm/multiply_raster/task/{}/download/", task_id);
        let (status, _, _) = send(&app, get_req(&download_uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&app, head_req(&download_uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let missing = uuid::Uuid::new_v4();
        let (status, _, _) = send(
            &app,
            get_req(&format!("/api/cm/multiply_raster/task/{}/download/", missing)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dataset_endpoints() {
        let (app, _dir) = test_app().await;

        let (status, _, body) = send(&app, get_req("/api/datasets/")).await;
        assert_eq!(status, StatusCode::OK);
        let datasets = as_json(&body)["datasets"].as_array().unwrap().clone();
        assert_eq!(datasets.len(), 4);
        for dataset in &datasets {
            assert!(dataset.get("area_values").is_none());
        }

        let (status, _, body) = send(&app, get_req("/api/datasets/areas/")).await;
        assert_eq!(status, StatusCode::OK);
        let areas = as_json(&body)["areas"].as_array().unwrap().clone();
        assert_eq!(areas.len(), 5);
        assert_eq!(areas[0]["id"], "NUTS0");
    }

    #[tokio::test]
    async fn test_layer_name_is_plain_text() {
        let (app, _dir) = test_app().await;

        let (status, headers, body) =
            send(&app, get_req("/api/datasets/layer_name/heat_density_total/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert_eq!(&body[..], b"raster/heat_density_total");

        let (status, _, body) = send(
            &app,
            get_req(
                "/api/datasets/layer_name/electricity_generation/?variable=wind&time_period=2015",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"vector/electricity_generation/wind/2015");

        let (status, _, _) = send(&app, get_req("/api/datasets/layer_name/nope/")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_legend_for_dataset_and_cm_layers() {
        let (app, _dir) = test_app().await;

        let (status, _, body) =
            send(&app, get_req("/api/datasets/legend/raster/heat_density_total")).await;
        assert_eq!(status, StatusCode::OK);
        let legend = as_json(&body);
        assert_eq!(legend["name"], "Heat demand density");
        assert_eq!(legend["symbology"].as_array().unwrap().len(), 4);

        let task_id = submit(&app, "cm_heat_demand", json!({"threshold": 5.0})).await;
        let snapshot = wait_success(&app, "cm_heat_demand", &task_id).await;
        let layer = snapshot["result"]["geofiles"]["areas"].as_str().unwrap();

        let (status, _, body) =
            send(&app, get_req(&format!("/api/datasets/legend/{}", layer))).await;
        assert_eq!(status, StatusCode::OK);
        let legend = as_json(&body);
        assert_eq!(legend["type"], "custom");
        assert_eq!(legend["symbology"].as_array().unwrap().len(), 4);

        let (status, _, _) = send(&app, get_req("/api/datasets/legend/area/NUTS2")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, _) = send(&app, get_req("/api/datasets/legend/satellite/foo")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
