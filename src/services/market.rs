//! Market price lookup through the Perplexity chat completions API.
//!
//! One request per line item. The answer is free text with three labelled
//! fields which `parse_market_response` turns into a [`MarketQuote`].

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::analysis::MarketQuote;

const NOT_FOUND_ANALYSIS: &str = "Информация не найдена";

const AVERAGE_LABELS: &[&str] = &["СРЕДНЯЯ ЦЕНА:", "AVERAGE PRICE:"];
const MIN_LABELS: &[&str] = &["МИНИМАЛЬНАЯ ЦЕНА:", "MIN PRICE:", "MINIMUM PRICE:"];
const ANALYSIS_LABELS: &[&str] = &["АНАЛИЗ:", "ANALYSIS:"];

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("market search request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("market search returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Price lookup capability used by the enrichment step.
#[async_trait]
pub trait MarketSearch: Send + Sync {
    async fn search_price(&self, item_name: &str, unit: &str) -> Result<MarketQuote, MarketError>;
}

/// Client for the Perplexity API.
#[derive(Clone)]
pub struct PerplexityClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl PerplexityClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_seconds: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        info!(model = model, "Perplexity client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl MarketSearch for PerplexityClient {
    #[instrument(skip(self))]
    async fn search_price(&self, item_name: &str, unit: &str) -> Result<MarketQuote, MarketError> {
        let prompt = build_search_prompt(item_name, unit);
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: &prompt,
                }],
            })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Perplexity request failed");
                MarketError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Perplexity returned an error");
            return Err(MarketError::Status { status, body });
        }

        let data: ChatResponse = response.json().await?;
        let Some(choice) = data.choices.into_iter().next() else {
            warn!("Empty response from Perplexity");
            return Ok(MarketQuote {
                analysis: NOT_FOUND_ANALYSIS.to_string(),
                ..MarketQuote::default()
            });
        };

        debug!(
            response = %choice.message.content.chars().take(200).collect::<String>(),
            "Perplexity answer"
        );

        let quote = parse_market_response(&choice.message.content);
        info!(
            average_price = ?quote.average_price,
            min_price = ?quote.min_price,
            "Market price lookup finished"
        );
        Ok(quote)
    }
}

/// Prompt asking for the three labelled fields the parser understands.
pub fn build_search_prompt(item_name: &str, unit: &str) -> String {
    format!(
        "Найди актуальную информацию о рыночных ценах на \"{item_name}\" в Украине.\n\
         \n\
         Единица измерения: {unit}\n\
         \n\
         Предоставь следующую информацию:\n\
         1. Средняя рыночная цена за {unit}\n\
         2. Минимальная цена за {unit}\n\
         3. Краткий анализ (2-3 предложения) с указанием конкретных источников информации (названия сайтов или магазинов)\n\
         \n\
         Формат ответа должен быть структурированным:\n\
         СРЕДНЯЯ ЦЕНА: [число] грн\n\
         МИНИМАЛЬНАЯ ЦЕНА: [число] грн\n\
         АНАЛИЗ: [текст с указанием источников]\n\
         \n\
         Если информация не найдена, укажи это явно."
    )
}

/// Parse the labelled free-text answer.
///
/// Labels are matched case-insensitively in Russian or English. A price is
/// the first number after the label (comma accepted as decimal separator).
/// Everything from the analysis label to the end becomes the analysis; when
/// no analysis label exists the whole answer is used.
pub fn parse_market_response(text: &str) -> MarketQuote {
    let mut quote = MarketQuote::default();
    let lines: Vec<&str> = text.trim().lines().map(str::trim).collect();

    for (idx, line) in lines.iter().enumerate() {
        let upper = line.to_uppercase();

        if has_label(&upper, AVERAGE_LABELS) {
            quote.average_price = value_after_colon(line).and_then(first_number);
            if quote.average_price.is_none() {
                warn!(line = %line, "Could not extract average price");
            }
        } else if has_label(&upper, MIN_LABELS) {
            quote.min_price = value_after_colon(line).and_then(first_number);
            if quote.min_price.is_none() {
                warn!(line = %line, "Could not extract minimum price");
            }
        } else if has_label(&upper, ANALYSIS_LABELS) {
            let mut parts = vec![value_after_colon(line).unwrap_or_default().trim()];
            parts.extend(lines[idx + 1..].iter().copied().filter(|l| !l.is_empty()));
            quote.analysis = parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            break;
        }
    }

    if quote.analysis.is_empty() {
        quote.analysis = text.trim().to_string();
    }
    quote
}

fn has_label(upper_line: &str, labels: &[&str]) -> bool {
    labels.iter().any(|label| upper_line.contains(label))
}

fn value_after_colon(line: &str) -> Option<&str> {
    line.split_once(':').map(|(_, rest)| rest)
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Grouped thousands ("1 250,50") first, then plain numbers.
        Regex::new(r"\d{1,3}(?:[ \u{a0}]\d{3})+(?:[.,]\d+)?|\d+(?:[.,]\d+)?")
            .expect("valid number pattern")
    })
}

fn first_number(text: &str) -> Option<f64> {
    let token = number_pattern().find(text)?.as_str();
    let normalized: String = token
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    normalized.parse().ok()
}
