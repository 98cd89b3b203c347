//! Local fallback artifacts: an `.xlsx` workbook and a JSON dump per upload.

use rust_xlsxwriter::{Format, FormatAlign, Workbook, XlsxError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::domain::analysis::{DocumentAnalysis, ExtendedItem, UserRef};

/// Header of the record-timestamp column in local workbooks.
const LOCAL_TIMESTAMP_HEADER: &str = "Дата заповнення";
const TOTAL_LABEL: &str = "ИТОГО:";
const MAX_COLUMN_WIDTH: usize = 50;

#[derive(Debug, Error)]
pub enum LocalStorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build workbook: {0}")]
    Excel(#[from] XlsxError),

    #[error("failed to serialize analysis: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Serialize)]
struct ProcessingInfo<'a> {
    user_id: i64,
    selected_project: &'a str,
    document_type: &'a str,
    processed_at: String,
    processing_method: &'static str,
}

#[derive(Serialize)]
struct JsonArtifact<'a> {
    #[serde(flatten)]
    analysis: &'a DocumentAnalysis<ExtendedItem>,
    processing_info: ProcessingInfo<'a>,
}

/// Writes fallback artifacts into two directories.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    excel_dir: PathBuf,
    json_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(excel_dir: impl Into<PathBuf>, json_dir: impl Into<PathBuf>) -> Self {
        Self {
            excel_dir: excel_dir.into(),
            json_dir: json_dir.into(),
        }
    }

    /// `{project}_analysis_{number|document}_{category}_{user_id}`, made safe
    /// for use as a file name.
    pub fn artifact_stem(
        analysis: &DocumentAnalysis<ExtendedItem>,
        project: &str,
        user_id: i64,
    ) -> String {
        let number = analysis
            .document_number
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("document");
        sanitize(&format!(
            "{project}_analysis_{number}_{}_{user_id}",
            analysis.category.sheet_name()
        ))
    }

    #[instrument(skip(self, analysis, user), fields(user_id = user.id))]
    pub async fn write_excel(
        &self,
        analysis: &DocumentAnalysis<ExtendedItem>,
        project: &str,
        user: &UserRef,
    ) -> Result<PathBuf, LocalStorageError> {
        ensure_dir(&self.excel_dir).await?;
        let path = self
            .excel_dir
            .join(format!("{}.xlsx", Self::artifact_stem(analysis, project, user.id)));

        let analysis = analysis.clone();
        let user = user.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || build_workbook(&analysis, &user, &target))
            .await?
            .map_err(|e| {
                error!(error = %e, "Failed to create workbook");
                e
            })?;

        info!(path = %path.display(), "Workbook created");
        Ok(path)
    }

    #[instrument(skip(self, analysis, user), fields(user_id = user.id))]
    pub async fn write_json(
        &self,
        analysis: &DocumentAnalysis<ExtendedItem>,
        project: &str,
        user: &UserRef,
    ) -> Result<PathBuf, LocalStorageError> {
        ensure_dir(&self.json_dir).await?;
        let path = self
            .json_dir
            .join(format!("{}.json", Self::artifact_stem(analysis, project, user.id)));

        let artifact = JsonArtifact {
            analysis,
            processing_info: ProcessingInfo {
                user_id: user.id,
                selected_project: project,
                document_type: analysis.category.sheet_name(),
                processed_at: chrono::Local::now().to_rfc3339(),
                processing_method: "local",
            },
        };
        let body = serde_json::to_vec_pretty(&artifact)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| LocalStorageError::Io {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "JSON artifact saved");
        Ok(path)
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), LocalStorageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| LocalStorageError::Io {
            path: dir.to_path_buf(),
            source,
        })
}

fn sanitize(stem: &str) -> String {
    stem.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

enum Cell {
    Text(String),
    Number(f64),
}

impl Cell {
    fn width(&self) -> usize {
        match self {
            Cell::Text(s) => s.chars().count(),
            Cell::Number(n) => n.to_string().chars().count(),
        }
    }
}

fn build_workbook(
    analysis: &DocumentAnalysis<ExtendedItem>,
    user: &UserRef,
    path: &Path,
) -> Result<(), LocalStorageError> {
    let mut headers: Vec<&str> = analysis.category.headers().to_vec();
    headers[9] = LOCAL_TIMESTAMP_HEADER;

    let recorded_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let text = |v: &Option<String>| Cell::Text(v.clone().unwrap_or_default());
    let rows: Vec<Vec<Cell>> = analysis
        .items
        .iter()
        .map(|item| {
            vec![
                text(&analysis.document_number),
                text(&analysis.date),
                Cell::Text(item.name.clone()),
                Cell::Text(item.unit_or_default().to_lowercase()),
                Cell::Number(item.quantity),
                Cell::Number(item.price),
                Cell::Number(item.total),
                text(&analysis.supplier),
                Cell::Text(String::new()),
                Cell::Text(recorded_at.clone()),
                Cell::Text(user.display()),
            ]
        })
        .collect();

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(analysis.category.sheet_name())?;

    let header_format = Format::new().set_bold().set_align(FormatAlign::Center);
    let bold = Format::new().set_bold();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for (col, header) in headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    for (idx, row) in rows.iter().enumerate() {
        let r = idx as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            match cell {
                Cell::Text(s) => worksheet.write_string(r, col as u16, s)?,
                Cell::Number(n) => worksheet.write_number(r, col as u16, *n)?,
            };
            widths[col] = widths[col].max(cell.width());
        }
    }

    if analysis.total_amount > 0.0 {
        let r = rows.len() as u32 + 1;
        worksheet.write_string_with_format(r, 3, TOTAL_LABEL, &bold)?;
        worksheet.write_number_with_format(r, 6, analysis.total_amount, &bold)?;
        widths[3] = widths[3].max(TOTAL_LABEL.chars().count());
        widths[6] = widths[6].max(Cell::Number(analysis.total_amount).width());
    }

    for (col, width) in widths.iter().enumerate() {
        let width = (*width + 2).min(MAX_COLUMN_WIDTH);
        worksheet.set_column_width(col as u16, width as f64)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    workbook.save(path)?;
    Ok(())
}
