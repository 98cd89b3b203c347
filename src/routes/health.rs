use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub analysis: String,
    pub enrichment: String,
    pub spreadsheets: String,
}

fn configured(enabled: bool) -> String {
    if enabled { "configured" } else { "disabled" }.to_string()
}

/// Health check endpoint - public
///
/// Reports which external capabilities were configured at startup. A bot
/// without the analysis service still answers, so the status is "degraded"
/// rather than an error.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pipeline = state.bot.pipeline();
    let status = if pipeline.has_analyzer() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: ServiceHealth {
            analysis: configured(pipeline.has_analyzer()),
            enrichment: configured(pipeline.has_market()),
            spreadsheets: configured(pipeline.has_sheets()),
        },
    })
}
