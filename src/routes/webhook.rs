//! Telegram webhook endpoint.

use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::app::AppState;
use crate::error::{ApiError, ApiResult};
use crate::telegram::types::Update;

pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Accept an update and handle it on a separate task so Telegram gets its
/// answer immediately.
pub async fn receive_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> ApiResult<Json<Value>> {
    if let Some(expected) = state.settings.telegram_webhook_secret.as_deref() {
        let provided = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            return Err(ApiError::Unauthorized("invalid webhook secret".to_string()));
        }
    }

    let update: Update = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid update: {e}")))?;
    debug!(update_id = update.update_id, "Update received");

    let bot = state.bot.clone();
    tokio::spawn(async move { bot.handle_update(update).await });

    Ok(Json(json!({ "ok": true })))
}
