//! Google Sheets persistence.
//!
//! Each project owns one spreadsheet with a section (worksheet) per document
//! category. Rows are appended to the section matching the category; the
//! section and its header row are created on first use.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::domain::analysis::{Category, DocumentAnalysis, ExtendedItem, UserRef};
use crate::services::google_auth::{AuthError, TokenSource};

const NEW_SECTION_ROWS: u32 = 10_000;
const NEW_SECTION_COLUMNS: u32 = 20;
const PROBE_CELL: &str = "A1";
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("spreadsheet authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("spreadsheet request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("spreadsheet API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("invalid spreadsheet API url")]
    InvalidUrl,
}

impl SheetsError {
    /// Failures worth retrying: transport errors, throttling and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            SheetsError::Transport(_) => true,
            SheetsError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            SheetsError::Auth(_) | SheetsError::InvalidUrl => false,
        }
    }

    /// Failures of a non-idempotent write that are safe to repeat: the
    /// server refused the request before applying it. A transport error may
    /// arrive after the rows were committed, so it is not repeated.
    pub fn is_retryable_write(&self) -> bool {
        matches!(
            self,
            SheetsError::Status { status, .. }
                if *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::SERVICE_UNAVAILABLE
        )
    }
}

/// Remote tabular store addressed by spreadsheet id and section name.
#[async_trait]
pub trait SpreadsheetSink: Send + Sync {
    /// True when both category sections exist and a scratch write succeeds.
    /// Never fails; every error reads as "no permission".
    async fn check_write_permission(&self, sheet_id: &str) -> bool;

    /// Append one row per item and return the section URL.
    async fn append(
        &self,
        analysis: &DocumentAnalysis<ExtendedItem>,
        user: &UserRef,
        sheet_id: &str,
        section: &str,
    ) -> Result<String, SheetsError>;

    /// Account a spreadsheet must be shared with to become writable.
    fn service_account_email(&self) -> String;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Spreadsheet {
    spreadsheet_url: String,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct BatchUpdateResponse {
    #[serde(default)]
    replies: Vec<BatchReply>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchReply {
    add_sheet: Option<SheetEntry>,
}

impl Spreadsheet {
    fn section(&self, title: &str) -> Option<&SheetProperties> {
        self.sheets
            .iter()
            .map(|s| &s.properties)
            .find(|p| p.title == title)
    }
}

/// Sheets v4 REST client.
#[derive(Clone)]
pub struct GoogleSheetsClient {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
    service_account_email: String,
    retry_max_elapsed: Duration,
}

impl GoogleSheetsClient {
    pub fn new(
        base_url: &str,
        tokens: Arc<dyn TokenSource>,
        service_account_email: &str,
        retry_max_elapsed: Duration,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        anyhow::ensure!(!base_url.cannot_be_a_base(), "invalid sheets API url");

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        info!(base_url = %base_url, "Sheets client initialized");

        Ok(Self {
            client,
            base_url,
            tokens,
            service_account_email: service_account_email.to_string(),
            retry_max_elapsed,
        })
    }

    fn endpoint(&self, spreadsheet_id: &str, tail: &[&str]) -> Result<Url, SheetsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsError::InvalidUrl)?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id])
            .extend(tail);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T, SheetsError> {
        let token = self.tokens.access_token().await?;
        debug!(method = %method, url = %url, "Sheets request");

        let mut request = self.client.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Status { status, body });
        }
        Ok(response.json().await?)
    }

    async fn spreadsheet(&self, id: &str) -> Result<Spreadsheet, SheetsError> {
        let mut url = self.endpoint(id, &[])?;
        url.query_pairs_mut()
            .append_pair("fields", "spreadsheetUrl,sheets.properties(sheetId,title)");
        self.call(Method::GET, url, None).await
    }

    async fn add_section(&self, id: &str, title: &str) -> Result<i64, SheetsError> {
        let url = self.endpoint(&format!("{id}:batchUpdate"), &[])?;

        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": {
                            "rowCount": NEW_SECTION_ROWS,
                            "columnCount": NEW_SECTION_COLUMNS
                        }
                    }
                }
            }]
        });
        let reply: BatchUpdateResponse = self.call(Method::POST, url, Some(&body)).await?;
        let sheet_id = reply
            .replies
            .into_iter()
            .find_map(|r| r.add_sheet)
            .map(|s| s.properties.sheet_id)
            .unwrap_or_default();

        info!(section = title, sheet_id = sheet_id, "Spreadsheet section created");
        Ok(sheet_id)
    }

    async fn values(&self, id: &str, range: &str) -> Result<Vec<Vec<Value>>, SheetsError> {
        let url = self.endpoint(id, &["values", range])?;
        let range: ValueRange = self.call(Method::GET, url, None).await?;
        Ok(range.values)
    }

    async fn write_values(
        &self,
        id: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<(), SheetsError> {
        let mut url = self.endpoint(id, &["values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({ "range": range, "values": rows });
        let _: Value = self.call(Method::PUT, url, Some(&body)).await?;
        Ok(())
    }

    async fn append_values(
        &self,
        id: &str,
        range: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<(), SheetsError> {
        let mut url = self.endpoint(id, &["values", &format!("{range}:append")])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "INSERT_ROWS");
        let body = json!({ "values": rows });
        let _: Value = self.call(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    /// Make sure `section` exists and has a header row. Every step is
    /// idempotent: a repeated run finds what an earlier run created.
    async fn prepare_section(
        &self,
        category: Category,
        sheet_id: &str,
        section: &str,
    ) -> Result<String, SheetsError> {
        let meta = self.spreadsheet(sheet_id).await?;
        let gid = match meta.section(section) {
            Some(props) => props.sheet_id,
            None => self.add_section(sheet_id, section).await?,
        };

        let header = self.values(sheet_id, &format!("{section}!1:1")).await?;
        if header.first().map_or(true, |row| row.is_empty()) {
            let headers = category.headers().iter().map(|h| Value::from(*h)).collect();
            self.write_values(sheet_id, &format!("{section}!A1"), vec![headers])
                .await?;
            debug!(section = section, "Header row written");
        }

        Ok(format!("{}#gid={}", meta.spreadsheet_url, gid))
    }

    /// Run `op` under the retry budget, repeating errors `retryable` accepts.
    async fn retrying<T, F, Fut>(
        &self,
        retryable: fn(&SheetsError) -> bool,
        mut op: F,
    ) -> Result<T, SheetsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SheetsError>>,
    {
        let policy = ExponentialBackoff {
            initial_interval: INITIAL_BACKOFF,
            max_elapsed_time: Some(self.retry_max_elapsed),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, move || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| {
                    if retryable(&e) {
                        warn!(error = %e, "Transient spreadsheet failure, retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }

    async fn try_probe(&self, sheet_id: &str) -> Result<bool, SheetsError> {
        let meta = self.spreadsheet(sheet_id).await?;
        let missing: Vec<&str> = Category::ALL
            .iter()
            .map(|c| c.sheet_name())
            .filter(|name| meta.section(name).is_none())
            .collect();
        if !missing.is_empty() {
            warn!(sheet_id = sheet_id, missing = ?missing, "Required sections missing");
            return Ok(false);
        }

        let probe = format!("{}!{PROBE_CELL}", Category::Materials.sheet_name());
        let original = self
            .values(sheet_id, &probe)
            .await?
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or_else(|| Value::from(""));

        self.write_values(sheet_id, &probe, vec![vec![Value::from("test")]])
            .await?;
        self.write_values(sheet_id, &probe, vec![vec![original]])
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl SpreadsheetSink for GoogleSheetsClient {
    #[instrument(skip(self))]
    async fn check_write_permission(&self, sheet_id: &str) -> bool {
        match self.try_probe(sheet_id).await {
            Ok(allowed) => {
                info!(allowed = allowed, "Spreadsheet permission checked");
                allowed
            }
            Err(SheetsError::Status { status, .. })
                if status == StatusCode::FORBIDDEN || status == StatusCode::NOT_FOUND =>
            {
                warn!(status = %status, "Spreadsheet not accessible");
                false
            }
            Err(e) => {
                error!(error = %e, "Spreadsheet permission check failed");
                false
            }
        }
    }

    #[instrument(skip(self, analysis, user), fields(user_id = user.id, items = analysis.items.len()))]
    async fn append(
        &self,
        analysis: &DocumentAnalysis<ExtendedItem>,
        user: &UserRef,
        sheet_id: &str,
        section: &str,
    ) -> Result<String, SheetsError> {
        let url = self
            .retrying(SheetsError::is_transient, || {
                self.prepare_section(analysis.category, sheet_id, section)
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Spreadsheet section unavailable");
                e
            })?;

        let rows = item_rows(analysis, user);
        let count = rows.len();
        if count > 0 {
            let range = format!("{section}!A1");
            self.retrying(SheetsError::is_retryable_write, || {
                self.append_values(sheet_id, &range, rows.clone())
            })
            .await
            .map_err(|e| {
                error!(error = %e, "Spreadsheet append failed");
                e
            })?;
        }

        info!(section = section, rows = count, "Rows appended to spreadsheet");
        Ok(url)
    }

    fn service_account_email(&self) -> String {
        self.service_account_email.clone()
    }
}

/// One row per item, in analysis order.
pub fn item_rows(analysis: &DocumentAnalysis<ExtendedItem>, user: &UserRef) -> Vec<Vec<Value>> {
    let recorded_at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let text = |v: &Option<String>| Value::from(v.clone().unwrap_or_default());

    analysis
        .items
        .iter()
        .map(|item| {
            vec![
                text(&analysis.document_number),
                text(&analysis.date),
                Value::from(item.name.clone()),
                Value::from(item.unit_or_default().to_lowercase()),
                Value::from(item.quantity),
                Value::from(item.price),
                Value::from(item.total),
                text(&analysis.supplier),
                Value::from(""),
                Value::from(recorded_at.clone()),
                Value::from(user.display()),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::DocumentItem;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticToken;

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn access_token(&self) -> Result<String, AuthError> {
            Ok("test-token".to_string())
        }
    }

    fn client(server: &MockServer, retry: Duration) -> GoogleSheetsClient {
        GoogleSheetsClient::new(
            &server.uri(),
            Arc::new(StaticToken),
            "bot@project.iam.gserviceaccount.com",
            retry,
        )
        .unwrap()
    }

    fn meta(sections: &[(&str, i64)]) -> Value {
        json!({
            "spreadsheetUrl": "https://docs.google.com/spreadsheets/d/sheet-1/edit",
            "sheets": sections
                .iter()
                .map(|(title, id)| json!({"properties": {"sheetId": id, "title": title}}))
                .collect::<Vec<_>>()
        })
    }

    fn analysis() -> DocumentAnalysis<ExtendedItem> {
        DocumentAnalysis {
            category: Category::Materials,
            document_type: "Накладная".to_string(),
            document_number: Some("17".to_string()),
            date: Some("2025-07-18".to_string()),
            supplier: Some("ТОВ Будмаркет".to_string()),
            customer: None,
            items: vec![
                ExtendedItem::unenriched(DocumentItem {
                    name: "Цемент".to_string(),
                    quantity: 10.0,
                    unit: Some("Мешок".to_string()),
                    price: 250.0,
                    total: 2500.0,
                }),
                ExtendedItem::unenriched(DocumentItem {
                    name: "Песок".to_string(),
                    quantity: 1.0,
                    unit: None,
                    price: 600.0,
                    total: 600.0,
                }),
            ],
            total_amount: 3100.0,
            currency: "UAH".to_string(),
            confidence: 0.9,
        }
    }

    fn user() -> UserRef {
        UserRef {
            id: 42,
            first_name: "Olena".to_string(),
            username: None,
        }
    }

    #[test]
    fn rows_follow_item_order() {
        let rows = item_rows(&analysis(), &user());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][2], "Цемент");
        assert_eq!(rows[0][3], "мешок");
        assert_eq!(rows[1][3], "шт");
        assert_eq!(rows[1][6], 600.0);
        assert_eq!(rows[0][10], "42 / Olena");
        assert_eq!(rows[0].len(), 11);
    }

    #[test]
    fn transient_classification() {
        let status = |code: u16| SheetsError::Status {
            status: StatusCode::from_u16(code).unwrap(),
            body: String::new(),
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(403).is_transient());
        assert!(!status(404).is_transient());

        assert!(status(429).is_retryable_write());
        assert!(status(503).is_retryable_write());
        assert!(!status(500).is_retryable_write());
        assert!(!status(502).is_retryable_write());
    }

    #[tokio::test]
    async fn transport_errors_are_not_repeated_for_appends() {
        let err = SheetsError::from(
            reqwest::Client::new()
                .get("http://127.0.0.1:1/")
                .send()
                .await
                .unwrap_err(),
        );
        assert!(err.is_transient());
        assert!(!err.is_retryable_write());
    }

    async fn mount_ready_section(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(&[("materials", 3), ("jobs", 4)])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!1:1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [["№"]]})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn ambiguous_append_failure_is_not_repeated() {
        let server = MockServer::start().await;
        mount_ready_section(&server).await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1:append"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .append(&analysis(), &user(), "sheet-1", "materials")
            .await
            .unwrap_err();
        assert!(matches!(err, SheetsError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test]
    async fn throttled_append_is_repeated() {
        let server = MockServer::start().await;
        mount_ready_section(&server).await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1:append"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1:append"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let url = client(&server, Duration::from_secs(5))
            .append(&analysis(), &user(), "sheet-1", "materials")
            .await
            .unwrap();
        assert!(url.ends_with("#gid=3"));
    }

    #[tokio::test]
    async fn append_creates_header_and_returns_section_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(&[("materials", 7), ("jobs", 8)])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!1:1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"range": "materials!1:1"})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1:append"))
            .and(query_param("valueInputOption", "USER_ENTERED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let url = client(&server, Duration::from_secs(1))
            .append(&analysis(), &user(), "sheet-1", "materials")
            .await
            .unwrap();
        assert_eq!(
            url,
            "https://docs.google.com/spreadsheets/d/sheet-1/edit#gid=7"
        );
    }

    #[tokio::test]
    async fn append_adds_missing_section() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(&[("materials", 0)])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1:batchUpdate"))
            .and(body_partial_json(json!({"requests": [{"addSheet": {"properties": {"title": "jobs"}}}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "replies": [{"addSheet": {"properties": {"sheetId": 99, "title": "jobs"}}}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/jobs!1:1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [["№"]]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/jobs!A1:append"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut jobs = analysis();
        jobs.category = Category::Jobs;
        let url = client(&server, Duration::from_secs(1))
            .append(&jobs, &user(), "sheet-1", "jobs")
            .await
            .unwrap();
        assert!(url.ends_with("#gid=99"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(&[("materials", 3), ("jobs", 4)])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!1:1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [["№"]]})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1:append"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let url = client(&server, Duration::from_secs(5))
            .append(&analysis(), &user(), "sheet-1", "materials")
            .await
            .unwrap();
        assert!(url.ends_with("#gid=3"));
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .append(&analysis(), &user(), "sheet-1", "materials")
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn probe_fails_without_both_sections() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(&[("materials", 0)])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        assert!(!client(&server, Duration::from_secs(1)).check_write_permission("sheet-1").await);
    }

    #[tokio::test]
    async fn probe_writes_and_restores_scratch_cell() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(meta(&[("materials", 0), ("jobs", 1)])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [["№"]]})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1"))
            .and(body_partial_json(json!({"values": [["test"]]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-1/values/materials!A1"))
            .and(body_partial_json(json!({"values": [["№"]]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server, Duration::from_secs(1)).check_write_permission("sheet-1").await);
    }

    #[tokio::test]
    async fn probe_reports_forbidden_as_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(!client(&server, Duration::from_secs(1)).check_write_permission("missing").await);
    }
}
