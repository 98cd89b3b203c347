//! Document processing pipeline.
//!
//! analyse -> enrich -> persist (spreadsheet, else local files) -> result.
//! Every call is independent; the only shared state read is the project
//! mapping, which is looked up fresh on each call.

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::domain::analysis::{
    Category, DocumentAnalysis, ExtendedItem, ProcessingResult, UserRef,
};
use crate::services::enrichment::enrich_items;
use crate::services::gemini::DocumentAnalyzer;
use crate::services::local_storage::LocalStorage;
use crate::services::market::MarketSearch;
use crate::services::sheets::SpreadsheetSink;
use crate::services::store::ProjectStore;

pub const ANALYSIS_UNAVAILABLE: &str = "Сервис анализа документов (Gemini) недоступен";
pub const ANALYSIS_FAILED: &str = "Не удалось проанализировать документ";
pub const EXCEL_FAILED: &str = "Не удалось создать Excel таблицу";
pub const JSON_FAILED: &str = "Не удалось сохранить JSON файл";

/// Sequences the external services for one uploaded file.
///
/// Each capability is optional; a missing analyser fails every request, a
/// missing market client skips enrichment and a missing spreadsheet client
/// sends everything to local storage.
#[derive(Clone)]
pub struct Pipeline {
    analyzer: Option<Arc<dyn DocumentAnalyzer>>,
    market: Option<Arc<dyn MarketSearch>>,
    sheets: Option<Arc<dyn SpreadsheetSink>>,
    projects: Arc<ProjectStore>,
    local: LocalStorage,
    max_concurrent: usize,
}

impl Pipeline {
    pub fn new(projects: Arc<ProjectStore>, local: LocalStorage, max_concurrent: usize) -> Self {
        Self {
            analyzer: None,
            market: None,
            sheets: None,
            projects,
            local,
            max_concurrent,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn DocumentAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_market(mut self, market: Arc<dyn MarketSearch>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn with_sheets(mut self, sheets: Arc<dyn SpreadsheetSink>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    pub fn has_market(&self) -> bool {
        self.market.is_some()
    }

    pub fn has_sheets(&self) -> bool {
        self.sheets.is_some()
    }

    #[instrument(skip(self, file, user, category), fields(user_id = user.id, category = %category))]
    pub async fn process(
        &self,
        file: &Path,
        category: Category,
        project: &str,
        user: &UserRef,
    ) -> ProcessingResult {
        let Some(analyzer) = &self.analyzer else {
            error!("Analysis service is not configured");
            return ProcessingResult::failure(ANALYSIS_UNAVAILABLE);
        };

        let analysis = match analyzer.analyze(file, category).await {
            Ok(analysis) => analysis,
            Err(e) => {
                error!(error = %e, "Document analysis failed");
                return ProcessingResult::failure(ANALYSIS_FAILED);
            }
        };
        info!(items = analysis.items.len(), "Document analysed");

        let analysis = self.enrich(analysis).await;

        if let Some(url) = self.persist_remote(&analysis, project, user).await {
            return ProcessingResult::remote(analysis, url);
        }

        self.persist_local(analysis, project, user).await
    }

    async fn enrich(&self, mut analysis: DocumentAnalysis) -> DocumentAnalysis<ExtendedItem> {
        let Some(market) = &self.market else {
            return analysis.without_market_data();
        };
        if analysis.items.is_empty() {
            return analysis.without_market_data();
        }

        let items = std::mem::take(&mut analysis.items);
        let fallback = items.clone();
        match enrich_items(items, analysis.category, &**market, self.max_concurrent).await {
            Ok(extended) => analysis.with_items(extended),
            Err(e) => {
                error!(error = %e, "Enrichment failed, continuing without market data");
                analysis.with_items(fallback.into_iter().map(ExtendedItem::unenriched).collect())
            }
        }
    }

    /// Section URL on success; `None` means "use local storage".
    async fn persist_remote(
        &self,
        analysis: &DocumentAnalysis<ExtendedItem>,
        project: &str,
        user: &UserRef,
    ) -> Option<String> {
        let Some(sheets) = &self.sheets else {
            warn!("Spreadsheet service is not configured, saving locally");
            return None;
        };
        let Some(sheet_id) = self.projects.sheet_id(project) else {
            warn!(project = project, "No spreadsheet mapped to project, saving locally");
            return None;
        };

        let section = analysis.category.sheet_name();
        match sheets.append(analysis, user, &sheet_id, section).await {
            Ok(url) => {
                info!(project = project, section = section, "Saved to spreadsheet");
                Some(url)
            }
            Err(e) => {
                error!(project = project, error = %e, "Spreadsheet append failed, saving locally");
                None
            }
        }
    }

    async fn persist_local(
        &self,
        analysis: DocumentAnalysis<ExtendedItem>,
        project: &str,
        user: &UserRef,
    ) -> ProcessingResult {
        let excel = match self.local.write_excel(&analysis, project, user).await {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Local workbook could not be created");
                return ProcessingResult::failure(EXCEL_FAILED);
            }
        };

        let json = match self.local.write_json(&analysis, project, user).await {
            Ok(path) => path,
            Err(e) => {
                error!(error = %e, "Local JSON could not be saved");
                if let Err(e) = tokio::fs::remove_file(&excel).await {
                    warn!(path = %excel.display(), error = %e, "Failed to remove orphan workbook");
                }
                return ProcessingResult::failure(JSON_FAILED);
            }
        };

        info!(project = project, "Saved locally");
        ProcessingResult::local(analysis, excel, json)
    }
}
