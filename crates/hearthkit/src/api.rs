use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::put;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::bridge::Bridge;
use crate::hap::HapError;
use crate::hap::Value;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
    bridge: String,
    accessories: usize,
}

/// Body of a characteristic write
#[derive(Deserialize)]
struct WriteRequest {
    value: Value,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    bridge: Arc<Bridge>,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
            bridge: state.bridge.name().to_string(),
            accessories: state.bridge.accessories().len(),
        }),
    )
}

/// Handler for GET /v1/accessories
#[tracing::instrument(skip(state))]
async fn accessories(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let accessories: Vec<_> = state
        .bridge
        .accessories()
        .iter()
        .map(|adapter| adapter.accessory().to_json())
        .collect();

    (
        StatusCode::OK,
        Json(serde_json::json!({ "accessories": accessories })),
    )
}

/// Handler for PUT /v1/accessories/:aid/characteristics/:iid
#[tracing::instrument(skip(state, request))]
async fn write_characteristic(
    State(state): State<Arc<AppState>>,
    Path((aid, iid)): Path<(u64, u64)>,
    Json(request): Json<WriteRequest>,
) -> Response {
    match state.bridge.write(aid, iid, request.value) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::info!("Rejected write to {}.{}: {}", aid, iid, e);
            let status = match e {
                HapError::UnknownAccessory(_) | HapError::UnknownCharacteristic { .. } => {
                    StatusCode::NOT_FOUND
                }
                _ => StatusCode::BAD_REQUEST,
            };
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/accessories", get(accessories))
        .route(
            "/v1/accessories/:aid/characteristics/:iid",
            put(write_characteristic),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP status API
///
/// Runs until `shutdown_rx` fires or its sender is dropped.
pub async fn serve(
    listen: String,
    port: u16,
    bridge: Arc<Bridge>,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState { version, bridge });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port).parse()?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
