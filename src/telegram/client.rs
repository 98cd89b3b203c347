//! Telegram Bot API client.
//!
//! Only the calls the bot needs: sending text, fetching attachments and
//! sending a file back to the chat.

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use super::types::{ApiResponse, File, ReplyMarkup};

const PARSE_MODE: &str = "HTML";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("telegram API error: {description}")]
    Api { description: String },

    #[error("file I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Outgoing side of the chat transport.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> Result<(), TelegramError>;

    /// Fetch an attachment by file id and write it to `dest`.
    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), TelegramError>;

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TelegramError>;
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
}

#[derive(Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

impl TelegramClient {
    pub fn new(base_url: &str, token: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        info!(base_url = base_url, "Telegram client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.base_url, self.token, file_path)
    }

    async fn call<T: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &T,
    ) -> Result<R, TelegramError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        unwrap_envelope(method, response).await
    }

    /// Resolve a file id to its download path.
    #[instrument(skip(self))]
    pub async fn get_file(&self, file_id: &str) -> Result<String, TelegramError> {
        let file: File = self.call("getFile", &GetFile { file_id }).await?;
        file.file_path.ok_or_else(|| TelegramError::Api {
            description: format!("file {} has no download path", file.file_id),
        })
    }

    #[instrument(skip(self, dest))]
    pub async fn download_file(&self, file_path: &str, dest: &Path) -> Result<(), TelegramError> {
        let bytes = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(dest, &bytes).await?;
        debug!(bytes = bytes.len(), dest = %dest.display(), "File downloaded");
        Ok(())
    }
}

async fn unwrap_envelope<R: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<R, TelegramError> {
    let envelope: ApiResponse<R> = response.json().await?;
    match (envelope.ok, envelope.result) {
        (true, Some(result)) => Ok(result),
        _ => {
            let description = envelope
                .description
                .unwrap_or_else(|| "no description".to_string());
            error!(method = method, description = %description, "Telegram API call rejected");
            Err(TelegramError::Api { description })
        }
    }
}

#[async_trait]
impl ChatApi for TelegramClient {
    #[instrument(skip(self, text, markup))]
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markup: Option<ReplyMarkup>,
    ) -> Result<(), TelegramError> {
        let _: serde_json::Value = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id,
                    text,
                    parse_mode: PARSE_MODE,
                    reply_markup: markup,
                },
            )
            .await?;
        Ok(())
    }

    async fn download(&self, file_id: &str, dest: &Path) -> Result<(), TelegramError> {
        let file_path = self.get_file(file_id).await?;
        self.download_file(&file_path, dest).await
    }

    #[instrument(skip(self, path, caption))]
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        file_name: &str,
        caption: &str,
    ) -> Result<(), TelegramError> {
        let bytes = tokio::fs::read(path).await?;
        let form = multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", PARSE_MODE)
            .part(
                "document",
                multipart::Part::bytes(bytes).file_name(file_name.to_string()),
            );

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        let _: serde_json::Value = unwrap_envelope("sendDocument", response).await?;
        Ok(())
    }
}
