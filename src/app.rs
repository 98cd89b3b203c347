use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::bot::{Bot, BotOptions};
use crate::config::Settings;
use crate::middleware::request_id_layer;
use crate::routes;
use crate::services::{
    GeminiClient, GoogleSheetsClient, LocalStorage, PerplexityClient, Pipeline, ProjectStore,
    ServiceAccountAuth, UserStore,
};
use crate::telegram::TelegramClient;

/// Telegram updates are small JSON documents; attachments are fetched separately.
const MAX_UPDATE_BYTES: usize = 1024 * 1024;

/// Shared application state
pub struct AppState {
    pub settings: Settings,
    pub bot: Arc<Bot>,
}

impl AppState {
    pub fn new(settings: Settings, bot: Bot) -> Arc<Self> {
        Arc::new(Self {
            settings,
            bot: Arc::new(bot),
        })
    }
}

/// Open the stores and wire every configured external service into the bot.
///
/// Missing API keys or an unreadable credentials file disable the matching
/// capability instead of failing startup.
pub fn build_bot(settings: &Settings) -> Result<Bot> {
    let projects = Arc::new(
        ProjectStore::open(settings.project_mapping_path())
            .context("Failed to open project mapping store")?,
    );
    let users = Arc::new(
        UserStore::open(settings.user_mapping_path())
            .context("Failed to open user mapping store")?,
    );
    tracing::info!(projects = projects.project_names().len(), "Stores loaded");

    let local = LocalStorage::new(&settings.excel_dir, &settings.json_dir);
    let mut pipeline = Pipeline::new(projects.clone(), local, settings.enrich_max_concurrent);

    match &settings.gemini_api_key {
        Some(key) => {
            let gemini = GeminiClient::new(
                &settings.gemini_api_url,
                key,
                &settings.gemini_model,
                settings.gemini_timeout_seconds,
            )?;
            pipeline = pipeline.with_analyzer(Arc::new(gemini));
        }
        None => tracing::warn!("GEMINI_API_KEY not set, document analysis disabled"),
    }

    match &settings.perplexity_api_key {
        Some(key) => {
            let perplexity = PerplexityClient::new(
                &settings.perplexity_api_url,
                key,
                &settings.perplexity_model,
                settings.perplexity_timeout_seconds,
            )?;
            pipeline = pipeline.with_market(Arc::new(perplexity));
        }
        None => tracing::warn!("PERPLEXITY_API_KEY not set, market enrichment disabled"),
    }

    let sheets = match ServiceAccountAuth::from_file(&settings.google_credentials_path) {
        Ok(auth) => {
            let email = auth.service_account_email().to_string();
            let client = GoogleSheetsClient::new(
                &settings.google_sheets_api_url,
                Arc::new(auth),
                &email,
                Duration::from_secs(settings.sheets_retry_max_elapsed_seconds),
            )?;
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %settings.google_credentials_path.display(),
                "Google credentials unavailable, results will be stored locally"
            );
            None
        }
    };

    let chat = TelegramClient::new(&settings.telegram_api_url, &settings.telegram_bot_token)?;
    let options = BotOptions {
        admin_ids: settings.admin_user_ids.clone(),
        temp_dir: settings.temp_dir.clone(),
        max_file_size: settings.max_file_size_bytes,
    };

    let bot = match sheets {
        Some(sheets) => Bot::new(
            Arc::new(chat),
            pipeline.with_sheets(sheets.clone()),
            projects,
            users,
            options,
        )
        .with_sheets(sheets),
        None => Bot::new(Arc::new(chat), pipeline, projects, users, options),
    };
    Ok(bot)
}

/// Build the complete application with all middleware
pub fn create_app(state: Arc<AppState>) -> Router {
    // Build trace layer (use DEBUG for spans to reduce overhead at INFO level)
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::DEBUG));

    // Request ID layers
    let (set_request_id, propagate_request_id) = request_id_layer();

    Router::new()
        .merge(routes::api_router())
        // Middleware stack (applied bottom-up)
        .layer(RequestBodyLimitLayer::new(MAX_UPDATE_BYTES))
        .layer(propagate_request_id)
        .layer(trace_layer)
        .layer(set_request_id)
        .with_state(state)
}
