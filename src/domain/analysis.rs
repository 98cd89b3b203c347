//! Document analysis domain types
//!
//! Line items and document headers extracted from invoices, acts and receipts,
//! plus the market-enriched item shape and the per-upload processing result.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default unit when the document does not state one.
pub const DEFAULT_UNIT: &str = "шт";

/// Default currency when the document does not state one.
pub const DEFAULT_CURRENCY: &str = "UAH";

/// Minimum length of a market analysis worth keeping.
const MIN_MARKET_ANALYSIS_CHARS: usize = 10;

// ============================================================================
// Category
// ============================================================================

/// Document category: materials (goods) or jobs (services).
///
/// Selects the analysis instruction, the schema defaults, the spreadsheet
/// section and the header set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Materials,
    Jobs,
}

/// Header row shared by the remote section and the local workbook.
pub type HeaderRow = [&'static str; 11];

const MATERIALS_HEADERS: HeaderRow = [
    "№",
    "Дата",
    "Найменування",
    "Од вим",
    "К-сть",
    "Цiна",
    "Сума",
    "Постачальник",
    "Примiтки",
    "Дата внесення",
    "TelegramID / First Name",
];

const JOBS_HEADERS: HeaderRow = [
    "№",
    "Дата",
    "Найменування послуги",
    "Од вим",
    "К-сть",
    "Цiна",
    "Сума",
    "Виконавець",
    "Примiтки",
    "Дата внесення",
    "TelegramID / First Name",
];

impl Category {
    pub const ALL: [Category; 2] = [Category::Materials, Category::Jobs];

    /// Name of the spreadsheet section holding rows of this category.
    pub fn sheet_name(&self) -> &'static str {
        match self {
            Category::Materials => "materials",
            Category::Jobs => "jobs",
        }
    }

    /// Human readable label used in chat replies.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Materials => "товары",
            Category::Jobs => "услуги",
        }
    }

    pub fn default_document_type(&self) -> &'static str {
        match self {
            Category::Materials => "Товарный чек",
            Category::Jobs => "Акт выполненных работ",
        }
    }

    pub fn default_item_name(&self) -> &'static str {
        match self {
            Category::Materials => "Уточните название",
            Category::Jobs => "Уточните название услуги",
        }
    }

    pub fn headers(&self) -> &'static HeaderRow {
        match self {
            Category::Materials => &MATERIALS_HEADERS,
            Category::Jobs => &JOBS_HEADERS,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.sheet_name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown document category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "materials" | "goods" => Ok(Category::Materials),
            "jobs" | "services" => Ok(Category::Jobs),
            other => Err(UnknownCategory(other.to_string())),
        }
    }
}

// ============================================================================
// Items
// ============================================================================

/// One line of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentItem {
    pub name: String,
    pub quantity: f64,
    pub unit: Option<String>,
    pub price: f64,
    pub total: f64,
}

impl DocumentItem {
    pub fn unit_or_default(&self) -> &str {
        self.unit
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_UNIT)
    }
}

/// Market lookup outcome for one item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MarketQuote {
    pub average_price: Option<f64>,
    pub min_price: Option<f64>,
    pub analysis: String,
}

/// A line item together with optional market data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtendedItem {
    #[serde(flatten)]
    pub item: DocumentItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_market_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_market_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_analysis: Option<String>,
}

impl ExtendedItem {
    /// Item without market data (lookup skipped or failed).
    pub fn unenriched(item: DocumentItem) -> Self {
        Self {
            item,
            average_market_price: None,
            min_market_price: None,
            market_analysis: None,
        }
    }

    /// Item with market data. Negative or non-finite prices and analyses
    /// shorter than ten characters are dropped.
    pub fn with_quote(item: DocumentItem, quote: MarketQuote) -> Self {
        Self {
            item,
            average_market_price: quote.average_price.filter(valid_price),
            min_market_price: quote.min_price.filter(valid_price),
            market_analysis: meaningful_analysis(quote.analysis),
        }
    }

    pub fn has_market_data(&self) -> bool {
        self.average_market_price.is_some() || self.min_market_price.is_some()
    }
}

impl std::ops::Deref for ExtendedItem {
    type Target = DocumentItem;

    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

fn valid_price(price: &f64) -> bool {
    price.is_finite() && *price >= 0.0
}

fn meaningful_analysis(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_MARKET_ANALYSIS_CHARS {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Analysis
// ============================================================================

/// Structured result of analysing one document.
///
/// `items` keeps the order in which the document lists its lines; every
/// downstream artifact writes rows in the same order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentAnalysis<I = DocumentItem> {
    #[serde(rename = "document_category")]
    pub category: Category,
    pub document_type: String,
    pub document_number: Option<String>,
    pub date: Option<String>,
    pub supplier: Option<String>,
    pub customer: Option<String>,
    pub items: Vec<I>,
    pub total_amount: f64,
    pub currency: String,
    pub confidence: f64,
}

impl<I> DocumentAnalysis<I> {
    /// Replace the items, keeping the document header.
    pub fn with_items<J>(self, items: Vec<J>) -> DocumentAnalysis<J> {
        DocumentAnalysis {
            category: self.category,
            document_type: self.document_type,
            document_number: self.document_number,
            date: self.date,
            supplier: self.supplier,
            customer: self.customer,
            items,
            total_amount: self.total_amount,
            currency: self.currency,
            confidence: self.confidence,
        }
    }
}

impl DocumentAnalysis<DocumentItem> {
    /// Attach empty market data to every item.
    pub fn without_market_data(mut self) -> DocumentAnalysis<ExtendedItem> {
        let items = std::mem::take(&mut self.items);
        self.with_items(items.into_iter().map(ExtendedItem::unenriched).collect())
    }
}

/// Schema violation in an analysis payload.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("item {index}: missing or invalid field `{field}`")]
    InvalidItemField { index: usize, field: &'static str },

    #[error("field `{0}` must not be negative")]
    Negative(&'static str),
}

/// Analysis payload as returned by the understanding service. Every field is
/// optional so that category defaults can be applied afterwards.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAnalysis {
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub document_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<RawItem>>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total: Option<f64>,
}

impl RawAnalysis {
    /// Validate against the category schema and apply its defaults.
    pub fn into_analysis(self, category: Category) -> Result<DocumentAnalysis, SchemaError> {
        let items = self
            .items
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, raw)| raw.into_item(index, category))
            .collect::<Result<Vec<_>, _>>()?;

        let total_amount = self.total_amount.unwrap_or(0.0);
        if total_amount < 0.0 {
            return Err(SchemaError::Negative("total_amount"));
        }

        Ok(DocumentAnalysis {
            category,
            document_type: non_empty(self.document_type)
                .unwrap_or_else(|| category.default_document_type().to_string()),
            document_number: non_empty(self.document_number),
            date: non_empty(self.date)
                .or_else(|| Some(chrono::Local::now().format("%Y-%m-%d").to_string())),
            supplier: non_empty(self.supplier),
            customer: non_empty(self.customer),
            items,
            total_amount,
            currency: non_empty(self.currency).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            confidence: self.confidence.unwrap_or(0.0),
        })
    }
}

impl RawItem {
    fn into_item(self, index: usize, category: Category) -> Result<DocumentItem, SchemaError> {
        let require = |value: Option<f64>, field: &'static str| {
            value.ok_or(SchemaError::InvalidItemField { index, field })
        };

        Ok(DocumentItem {
            name: non_empty(self.name).unwrap_or_else(|| category.default_item_name().to_string()),
            quantity: require(self.quantity, "quantity")?,
            unit: Some(non_empty(self.unit).unwrap_or_else(|| DEFAULT_UNIT.to_string())),
            price: require(self.price, "price")?,
            total: require(self.total, "total")?,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts JSON numbers and numeric strings ("1 250,50").
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    })
}

/// Accepts strings and numbers (document numbers are often bare integers).
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ============================================================================
// Processing result
// ============================================================================

/// Identity of the user who submitted a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

impl UserRef {
    /// Value written to the "user identity" column.
    pub fn display(&self) -> String {
        format!("{} / {}", self.id, self.first_name)
    }
}

/// Outcome of processing one uploaded file.
///
/// On success exactly one destination is set: either the remote section link
/// or both local artifact paths.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    pub success: bool,
    pub analysis: Option<DocumentAnalysis<ExtendedItem>>,
    pub error_message: Option<String>,
    pub google_sheet_url: Option<String>,
    pub local_excel_path: Option<PathBuf>,
    pub local_json_path: Option<PathBuf>,
    pub is_local_processing: bool,
}

impl ProcessingResult {
    pub fn remote(analysis: DocumentAnalysis<ExtendedItem>, sheet_url: String) -> Self {
        Self {
            success: true,
            analysis: Some(analysis),
            error_message: None,
            google_sheet_url: Some(sheet_url),
            local_excel_path: None,
            local_json_path: None,
            is_local_processing: false,
        }
    }

    pub fn local(
        analysis: DocumentAnalysis<ExtendedItem>,
        excel_path: PathBuf,
        json_path: PathBuf,
    ) -> Self {
        Self {
            success: true,
            analysis: Some(analysis),
            error_message: None,
            google_sheet_url: None,
            local_excel_path: Some(excel_path),
            local_json_path: Some(json_path),
            is_local_processing: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            analysis: None,
            error_message: Some(message.into()),
            google_sheet_url: None,
            local_excel_path: None,
            local_json_path: None,
            is_local_processing: false,
        }
    }
}
