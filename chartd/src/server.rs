use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chart_freshness::prelude::*;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(provider: ChartProvider) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .route("/charts/:symbol/:timeframe", get(cached_chart))
        .route("/charts/:symbol/:timeframe/fresh", get(fresh_chart))
        .layer(TraceLayer::new_for_http())
        .with_state(provider)
}

pub async fn serve(addr: String, provider: ChartProvider) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Status server listening on http://{}", addr);
    axum::serve(listener, router(provider)).await?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn status(State(provider): State<ChartProvider>) -> Json<SchedulerStatus> {
    Json(provider.get_status())
}

async fn cached_chart(
    State(provider): State<ChartProvider>,
    Path((symbol, timeframe)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    match provider.get_chart(&symbol, &timeframe, None) {
        Ok(Some(snapshot)) => (StatusCode::OK, Json(chart_json(&snapshot))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("No valid chart for {} {}", symbol, timeframe) })),
        ),
        Err(e) => bad_request(e),
    }
}

async fn fresh_chart(
    State(provider): State<ChartProvider>,
    Path((symbol, timeframe)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    match provider.get_fresh_chart_async(&symbol, &timeframe).await {
        Ok(snapshot) => (StatusCode::OK, Json(chart_json(&snapshot))),
        Err(e) => bad_request(e),
    }
}

fn bad_request(e: ChartError) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
}

fn chart_json(snapshot: &Snapshot) -> Value {
    json!({
        "symbol": snapshot.symbol,
        "timeframe": snapshot.timeframe,
        "timestamp": snapshot.timestamp,
        "age_seconds": snapshot.age_seconds(),
        "generation_time_ms": snapshot.generation_time_ms,
        "indicators": snapshot.indicators,
        "error": snapshot.error,
        "file_path": snapshot.file_path,
        "image_base64": snapshot.image_base64(),
    })
}
