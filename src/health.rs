//! # Service Health Surface
//!
//! Two read-only endpoints: a root service descriptor listing the active
//! rooms and a health check with uptime and relay/pipeline counters.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn root(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "service": "voice-bridge-backend",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "active_rooms": state.registry.active_calls(),
    }))
}

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics_snapshot();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "active_rooms": state.registry.active_calls().len(),
        "connections": {
            "active": metrics.active_connections,
            "total": metrics.connections_opened,
        },
        "pipeline": {
            "started": metrics.pipelines_started,
            "failed": metrics.pipelines_failed,
            "transcriptions_broadcast": metrics.transcriptions_broadcast,
            "chunks_suppressed": metrics.chunks_suppressed,
        },
        "audio": {
            "sample_rate": state.config.audio.sample_rate,
            "buffer_threshold_bytes": state.config.audio.buffer_threshold_bytes(),
        },
    }))
}
