//! Document understanding through the Gemini API.
//!
//! The file is uploaded with the resumable upload protocol, then a single
//! `generateContent` call pairs the category instruction with the uploaded
//! file. Images are re-encoded to an RGB JPEG copy first; the copy lives in a
//! temp file that is removed when the call returns.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::domain::analysis::{Category, DocumentAnalysis, RawAnalysis, SchemaError};
use crate::domain::attachment::{mime_type_for, AttachmentKind};
use crate::services::prompts::analysis_instruction;

const JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("analysis service returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("upload session did not return an upload url")]
    MissingUploadUrl,

    #[error("analysis service returned an empty response")]
    EmptyResponse,

    #[error("analysis response is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("analysis response does not match the schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("failed to read input file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to prepare image: {0}")]
    Image(#[from] image::ImageError),
}

/// Turns an uploaded file into a structured analysis.
#[async_trait]
pub trait DocumentAnalyzer: Send + Sync {
    async fn analyze(&self, file: &Path, category: Category)
        -> Result<DocumentAnalysis, AnalysisError>;
}

/// Client for the Gemini generative language API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

/// File metadata returned by the upload endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    uri: String,
    mime_type: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout_seconds: u64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        info!(model = model, "Gemini client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    /// Upload `path` and return the service-side file reference.
    #[instrument(skip(self))]
    async fn upload(&self, path: &Path, mime_type: &str) -> Result<UploadedFile, AnalysisError> {
        let bytes = tokio::fs::read(path).await?;
        let display_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document");

        let start = self
            .client
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(AnalysisError::MissingUploadUrl)?;

        let size = bytes.len();
        let finish = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let uploaded: UploadResponse = check_status(finish).await?.json().await?;

        debug!(uri = %uploaded.file.uri, bytes = size, "File uploaded");
        Ok(uploaded.file)
    }

    #[instrument(skip(self, instruction, file))]
    async fn generate(
        &self,
        instruction: &str,
        file: &UploadedFile,
    ) -> Result<String, AnalysisError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": instruction },
                    { "file_data": { "mime_type": file.mime_type, "file_uri": file.uri } }
                ]
            }]
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Gemini request failed");
                AnalysisError::Transport(e)
            })?;
        let data: GenerateResponse = check_status(response).await?.json().await?;

        let text: String = data
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        Ok(text)
    }
}

#[async_trait]
impl DocumentAnalyzer for GeminiClient {
    #[instrument(skip(self, file), fields(file = %file.display()))]
    async fn analyze(
        &self,
        file: &Path,
        category: Category,
    ) -> Result<DocumentAnalysis, AnalysisError> {
        // Held until the end of the call so the copy outlives the upload.
        let normalized = match AttachmentKind::of_path(file) {
            AttachmentKind::Image => Some(normalize_image(file.to_path_buf()).await?),
            AttachmentKind::Document => None,
        };
        let (upload_path, mime_type) = match &normalized {
            Some(copy) => (copy.path(), "image/jpeg"),
            None => (file, mime_type_for(file)),
        };

        info!(category = %category, "Sending file for analysis");
        let uploaded = self.upload(upload_path, mime_type).await?;
        let text = self
            .generate(analysis_instruction(category), &uploaded)
            .await?;

        let analysis = parse_analysis_response(&text, category)?;
        info!(
            items = analysis.items.len(),
            total_amount = analysis.total_amount,
            "Document analysed"
        );
        Ok(analysis)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AnalysisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = %status, body = %body, "Gemini returned an error");
    Err(AnalysisError::Status { status, body })
}

/// Re-encode an image as an RGB JPEG next to the original.
///
/// The returned temp file is deleted when dropped.
pub async fn normalize_image(path: PathBuf) -> Result<NamedTempFile, AnalysisError> {
    tokio::task::spawn_blocking(move || -> Result<NamedTempFile, AnalysisError> {
        let rgb = image::open(&path)?.to_rgb8();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let copy = tempfile::Builder::new()
            .prefix("temp_")
            .suffix(".jpg")
            .tempfile_in(dir)?;

        let mut writer = BufWriter::new(copy.as_file());
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
            .encode_image(&rgb)?;
        writer.flush()?;
        drop(writer);

        debug!(
            width = rgb.width(),
            height = rgb.height(),
            "Image normalized to RGB JPEG"
        );
        Ok(copy)
    })
    .await
    .map_err(|e| AnalysisError::Io(std::io::Error::other(e)))?
}

/// Strip an optional markdown fence, parse JSON and apply category defaults.
pub fn parse_analysis_response(
    text: &str,
    category: Category,
) -> Result<DocumentAnalysis, AnalysisError> {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    let body = body.trim();

    if body.is_empty() {
        error!("Gemini returned an empty response");
        return Err(AnalysisError::EmptyResponse);
    }

    let raw: RawAnalysis = serde_json::from_str(body).map_err(|e| {
        error!(error = %e, response = %text, "Failed to parse Gemini response as JSON");
        AnalysisError::InvalidJson(e)
    })?;

    raw.into_analysis(category).map_err(|e| {
        error!(error = %e, response = %text, "Gemini response failed validation");
        AnalysisError::Schema(e)
    })
}
