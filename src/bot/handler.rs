//! Update handler: classifies messages, drives the conversation and admin
//! flows, runs the pipeline and reports results back to the chat.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::bot::admin::{AdminAction, AdminInput};
use crate::bot::messages;
use crate::bot::session::SessionStore;
use crate::bot::state::{Action, Input};
use crate::domain::analysis::{Category, ProcessingResult, UserRef};
use crate::domain::attachment::{is_supported_file_name, AttachmentKind, IMAGE_EXTENSIONS};
use crate::services::pipeline::Pipeline;
use crate::services::sheets::SpreadsheetSink;
use crate::services::store::{offload, ProjectStore, UserStore};
use crate::telegram::types::{Message, ReplyMarkup, Update};
use crate::telegram::{ChatApi, TelegramError};

/// Static bot settings.
#[derive(Debug, Clone)]
pub struct BotOptions {
    pub admin_ids: HashSet<i64>,
    pub temp_dir: PathBuf,
    pub max_file_size: u64,
}

/// Attachment carried by a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_id: String,
    pub file_name: String,
    pub kind: AttachmentKind,
}

pub struct Bot {
    chat: Arc<dyn ChatApi>,
    pipeline: Pipeline,
    projects: Arc<ProjectStore>,
    users: Arc<UserStore>,
    sheets: Option<Arc<dyn SpreadsheetSink>>,
    sessions: SessionStore,
    options: BotOptions,
}

impl Bot {
    pub fn new(
        chat: Arc<dyn ChatApi>,
        pipeline: Pipeline,
        projects: Arc<ProjectStore>,
        users: Arc<UserStore>,
        options: BotOptions,
    ) -> Self {
        Self {
            chat,
            pipeline,
            projects,
            users,
            sheets: None,
            sessions: SessionStore::new(),
            options,
        }
    }

    /// Spreadsheet client used by the admin flow to verify new mappings.
    pub fn with_sheets(mut self, sheets: Arc<dyn SpreadsheetSink>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Handle one update. Errors are logged; nothing is returned to the caller.
    #[instrument(skip(self, update), fields(update_id = update.update_id))]
    pub async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            debug!("Ignoring update without a message");
            return;
        };
        let Some(from) = message.from.clone() else {
            return;
        };
        if from.is_bot {
            return;
        }

        let users = self.users.clone();
        let (user_id, username) = (from.id, from.username.clone());
        if let Err(e) = offload(move || users.update(user_id, username.as_deref())).await {
            warn!(error = %e, user_id = from.id, "Failed to update user mapping");
        }

        let user = UserRef {
            id: from.id,
            first_name: from.first_name.clone(),
            username: from.username.clone(),
        };
        if let Err(e) = self.handle_message(&message, &user).await {
            error!(error = %e, user_id = user.id, "Failed to answer message");
        }
    }

    async fn handle_message(&self, message: &Message, user: &UserRef) -> Result<(), TelegramError> {
        let chat_id = message.chat.id;

        if self.options.admin_ids.contains(&user.id) {
            if let Some(text) = message.text.as_deref() {
                let action = self.sessions.advance_admin(user.id, &AdminInput::parse(text));
                if action != AdminAction::NotHandled {
                    return self.run_admin_action(chat_id, user.id, action).await;
                }
            }
        }

        let (input, attachment) = classify(message, self.options.max_file_size);
        let projects = self.projects.project_names();
        let step = self.sessions.advance(user.id, &input, &projects);
        debug!(
            user_id = user.id,
            stage = ?self.sessions.conversation(user.id).stage(),
            action = ?step.action,
            "Conversation step"
        );

        match step.action {
            Action::MainMenu => {
                self.send(chat_id, messages::MAIN_MENU, messages::main_menu())
                    .await
            }
            Action::NoProjects => {
                self.send(chat_id, messages::NO_PROJECTS, messages::main_menu())
                    .await
            }
            Action::AskProject { projects } => {
                self.send(
                    chat_id,
                    messages::CHOOSE_PROJECT,
                    messages::project_menu(&projects),
                )
                .await
            }
            Action::UnknownProject { projects } => {
                self.send(
                    chat_id,
                    messages::UNKNOWN_PROJECT,
                    messages::project_menu(&projects),
                )
                .await
            }
            Action::AskCategory { project } => {
                self.send(
                    chat_id,
                    &messages::category_prompt(&project),
                    messages::category_menu(),
                )
                .await
            }
            Action::UnknownCategory => {
                self.send(chat_id, messages::UNKNOWN_CATEGORY, messages::category_menu())
                    .await
            }
            Action::AskFile { project, category } => {
                self.send(
                    chat_id,
                    &messages::file_prompt(&project, category),
                    messages::back_and_cancel(),
                )
                .await
            }
            Action::InvalidFormat => {
                self.send(chat_id, messages::INVALID_FORMAT, messages::back_and_cancel())
                    .await
            }
            Action::PleaseWait => {
                self.send(chat_id, messages::PLEASE_WAIT, messages::cancel_only())
                    .await
            }
            Action::Cancelled => {
                self.send(chat_id, messages::CANCELLED, messages::main_menu())
                    .await
            }
            Action::Ignore => Ok(()),
            Action::StartProcessing { project, category } => {
                let Some(ticket) = step.ticket else {
                    return Ok(());
                };
                let Some(attachment) = attachment else {
                    error!(user_id = user.id, "Processing started without an attachment");
                    self.sessions.finish(user.id, ticket);
                    return Ok(());
                };
                self.process_attachment(chat_id, user, attachment, &project, category, ticket)
                    .await
            }
        }
    }

    async fn send(&self, chat_id: i64, text: &str, markup: ReplyMarkup) -> Result<(), TelegramError> {
        self.chat.send_message(chat_id, text, Some(markup)).await
    }

    // ========================================================================
    // Processing
    // ========================================================================

    #[instrument(skip(self, user, attachment, category), fields(user_id = user.id, category = %category, file = %attachment.file_name))]
    async fn process_attachment(
        &self,
        chat_id: i64,
        user: &UserRef,
        attachment: Attachment,
        project: &str,
        category: Category,
        ticket: Uuid,
    ) -> Result<(), TelegramError> {
        // The run owns the ticket from here on; only `finish` may release it.
        if let Err(e) = self
            .send(
                chat_id,
                messages::processing_notice(attachment.kind),
                messages::cancel_only(),
            )
            .await
        {
            warn!(error = %e, "Failed to send processing notice");
        }

        let result = match self.download(user.id, &attachment).await {
            Ok(file) => {
                let result = self
                    .pipeline
                    .process(file.path(), category, project, user)
                    .await;
                if let Err(e) = file.close() {
                    warn!(error = %e, "Failed to remove downloaded file");
                }
                result
            }
            Err(e) => {
                error!(error = %e, "Failed to download attachment");
                ProcessingResult::failure(messages::DOWNLOAD_FAILED)
            }
        };

        if !self.sessions.finish(user.id, ticket) {
            info!("Processing was cancelled, result discarded");
            return Ok(());
        }
        self.present(chat_id, result).await
    }

    /// Fetch the attachment into a temp file that is removed on drop.
    async fn download(
        &self,
        user_id: i64,
        attachment: &Attachment,
    ) -> Result<tempfile::NamedTempFile, TelegramError> {
        tokio::fs::create_dir_all(&self.options.temp_dir).await?;
        let file = tempfile::Builder::new()
            .prefix(&format!("temp_{user_id}_"))
            .suffix(&format!("_{}", attachment.file_name))
            .tempfile_in(&self.options.temp_dir)?;
        self.chat.download(&attachment.file_id, file.path()).await?;
        Ok(file)
    }

    async fn present(&self, chat_id: i64, result: ProcessingResult) -> Result<(), TelegramError> {
        let analysis = match (&result.analysis, result.success) {
            (Some(analysis), true) => analysis,
            _ => {
                let text = messages::failure(result.error_message.as_deref());
                return self.send(chat_id, &text, messages::main_menu()).await;
            }
        };

        let summary = messages::success_summary(&result, analysis);
        self.send(chat_id, &summary, messages::main_menu()).await?;

        if let Some(path) = result.local_excel_path.as_deref() {
            self.send_workbook(chat_id, path, &messages::excel_file_name(analysis))
                .await?;
        }

        for details in messages::item_details(analysis) {
            self.chat.send_message(chat_id, &details, None).await?;
        }
        info!(local = result.is_local_processing, "Result delivered");
        Ok(())
    }

    /// Send the local workbook and delete it afterwards.
    async fn send_workbook(&self, chat_id: i64, path: &Path, file_name: &str) -> Result<(), TelegramError> {
        match self
            .chat
            .send_document(chat_id, path, file_name, messages::EXCEL_CAPTION)
            .await
        {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(error = %e, path = %path.display(), "Failed to remove sent workbook");
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to send workbook");
                self.chat
                    .send_message(chat_id, messages::EXCEL_SEND_FAILED, None)
                    .await
            }
        }
    }

    // ========================================================================
    // Admin flow
    // ========================================================================

    async fn run_admin_action(
        &self,
        chat_id: i64,
        user_id: i64,
        action: AdminAction,
    ) -> Result<(), TelegramError> {
        match action {
            AdminAction::AskPointName => {
                self.send(chat_id, messages::ASK_POINT_NAME, messages::admin_cancel_menu())
                    .await
            }
            AdminAction::AskNewPointName => {
                self.send(
                    chat_id,
                    messages::ASK_NEW_POINT_NAME,
                    messages::admin_cancel_menu(),
                )
                .await
            }
            AdminAction::AskSheetId { point_name } => {
                self.send(
                    chat_id,
                    &messages::ask_sheet_id(&point_name),
                    messages::sheet_id_input_menu(),
                )
                .await
            }
            AdminAction::VerifySheet {
                point_name,
                sheet_id,
            } => {
                self.verify_and_save(chat_id, user_id, &point_name, &sheet_id)
                    .await
            }
            AdminAction::DeletePoint(name) if name.is_empty() => {
                self.chat
                    .send_message(chat_id, messages::DELETE_POINT_USAGE, None)
                    .await
            }
            AdminAction::DeletePoint(name) => {
                let projects = self.projects.clone();
                let key = name.clone();
                let text = match offload(move || projects.remove(&key)).await {
                    Ok(existed) => {
                        info!(admin_id = user_id, point = %name, existed, "Point removed");
                        messages::point_deleted(&name, existed)
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to remove point");
                        messages::store_failed(&e.to_string())
                    }
                };
                self.chat.send_message(chat_id, &text, None).await
            }
            AdminAction::ListPoints => {
                let points = self.projects.all();
                self.chat
                    .send_message(chat_id, &messages::points_list(&points), None)
                    .await
            }
            AdminAction::Cancelled => {
                self.send(chat_id, messages::ADMIN_CANCELLED, messages::main_menu())
                    .await
            }
            AdminAction::NotHandled => Ok(()),
        }
    }

    #[instrument(skip(self, chat_id))]
    async fn verify_and_save(
        &self,
        chat_id: i64,
        user_id: i64,
        point_name: &str,
        sheet_id: &str,
    ) -> Result<(), TelegramError> {
        let Some(sheets) = &self.sheets else {
            self.sessions.reset_admin(user_id);
            return self
                .send(chat_id, messages::SHEETS_NOT_CONFIGURED, messages::main_menu())
                .await;
        };

        self.chat
            .send_message(chat_id, messages::CHECKING_ACCESS, None)
            .await?;

        if !sheets.check_write_permission(sheet_id).await {
            warn!("No write access to spreadsheet");
            let text = messages::access_denied(&sheets.service_account_email());
            return self.send(chat_id, &text, messages::admin_cancel_menu()).await;
        }

        self.sessions.reset_admin(user_id);
        let projects = self.projects.clone();
        let (name, id) = (point_name.to_string(), sheet_id.to_string());
        match offload(move || projects.upsert(&name, &id)).await {
            Ok(()) => {
                info!("Point mapping saved");
                self.send(
                    chat_id,
                    &messages::point_saved(point_name, sheet_id),
                    messages::main_menu(),
                )
                .await
            }
            Err(e) => {
                error!(error = %e, "Failed to save point mapping");
                self.send(
                    chat_id,
                    &messages::store_failed(&e.to_string()),
                    messages::main_menu(),
                )
                .await
            }
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Map a raw message to a conversation input and, for files and photos, the
/// attachment to fetch. Oversized or unsupported files classify as `Other`.
pub fn classify(message: &Message, max_file_size: u64) -> (Input, Option<Attachment>) {
    if let Some(photo) = message.largest_photo() {
        if photo.file_size.is_some_and(|s| s > max_file_size) {
            return (Input::Other, None);
        }
        let attachment = Attachment {
            file_id: photo.file_id.clone(),
            file_name: format!("image_{}.jpg", safe_file_name(&photo.file_unique_id)),
            kind: AttachmentKind::Image,
        };
        return (Input::Attachment, Some(attachment));
    }

    if let Some(document) = &message.document {
        if document.file_size.is_some_and(|s| s > max_file_size) {
            return (Input::Other, None);
        }
        let name = safe_file_name(document.file_name.as_deref().unwrap_or("document"));
        let kind = AttachmentKind::detect(Some(&name), document.mime_type.as_deref());
        let file_name = match kind {
            _ if is_supported_file_name(&name) => name,
            AttachmentKind::Image => match image_extension(document.mime_type.as_deref()) {
                Some(ext) => format!("{name}.{ext}"),
                None => return (Input::Other, None),
            },
            AttachmentKind::Document => return (Input::Other, None),
        };
        let attachment = Attachment {
            file_id: document.file_id.clone(),
            file_name,
            kind,
        };
        return (Input::Attachment, Some(attachment));
    }

    match message.text.as_deref() {
        Some(text) => (Input::from_text(text), None),
        None => (Input::Other, None),
    }
}

fn image_extension(mime_type: Option<&str>) -> Option<&'static str> {
    let subtype = mime_type?.to_ascii_lowercase();
    let subtype = subtype.strip_prefix("image/")?;
    IMAGE_EXTENSIONS.iter().copied().find(|ext| *ext == subtype)
}

/// Last path component with characters unsafe in file names replaced.
fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.trim().is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{DocumentAnalysis, DocumentItem};
    use crate::services::gemini::{AnalysisError, DocumentAnalyzer};
    use crate::services::local_storage::LocalStorage;
    use crate::services::sheets::SheetsError;
    use crate::domain::analysis::ExtendedItem;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(String),
        Document { file_name: String, existed: bool },
    }

    #[derive(Default)]
    struct RecordingChat {
        sent: Mutex<Vec<Sent>>,
        downloads: Mutex<Vec<PathBuf>>,
        /// Texts containing this fragment fail to send.
        fail_containing: Option<&'static str>,
    }

    impl RecordingChat {
        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .filter_map(|s| match s {
                    Sent::Text(t) => Some(t.clone()),
                    Sent::Document { .. } => None,
                })
                .collect()
        }

        fn last_text(&self) -> String {
            self.texts().pop().unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatApi for RecordingChat {
        async fn send_message(
            &self,
            _chat_id: i64,
            text: &str,
            _markup: Option<ReplyMarkup>,
        ) -> Result<(), TelegramError> {
            if self.fail_containing.is_some_and(|f| text.contains(f)) {
                return Err(TelegramError::Api {
                    description: "Too Many Requests: retry after 5".to_string(),
                });
            }
            self.sent.lock().push(Sent::Text(text.to_string()));
            Ok(())
        }

        async fn download(&self, _file_id: &str, dest: &Path) -> Result<(), TelegramError> {
            tokio::fs::write(dest, b"%PDF-1.4 test").await?;
            self.downloads.lock().push(dest.to_path_buf());
            Ok(())
        }

        async fn send_document(
            &self,
            _chat_id: i64,
            path: &Path,
            file_name: &str,
            _caption: &str,
        ) -> Result<(), TelegramError> {
            self.sent.lock().push(Sent::Document {
                file_name: file_name.to_string(),
                existed: path.exists(),
            });
            Ok(())
        }
    }

    struct FixedAnalyzer;

    #[async_trait]
    impl DocumentAnalyzer for FixedAnalyzer {
        async fn analyze(
            &self,
            file: &Path,
            category: Category,
        ) -> Result<DocumentAnalysis, AnalysisError> {
            assert!(file.exists());
            Ok(DocumentAnalysis {
                category,
                document_type: "Накладная".to_string(),
                document_number: Some("77".to_string()),
                date: Some("2025-07-01".to_string()),
                supplier: Some("ТОВ Будмат".to_string()),
                customer: None,
                items: vec![DocumentItem {
                    name: "Цемент".to_string(),
                    quantity: 2.0,
                    unit: None,
                    price: 100.0,
                    total: 200.0,
                }],
                total_amount: 200.0,
                currency: "UAH".to_string(),
                confidence: 0.9,
            })
        }
    }

    struct AllowAll;

    #[async_trait]
    impl SpreadsheetSink for AllowAll {
        async fn check_write_permission(&self, sheet_id: &str) -> bool {
            sheet_id != "forbidden"
        }

        async fn append(
            &self,
            _analysis: &DocumentAnalysis<ExtendedItem>,
            _user: &UserRef,
            _sheet_id: &str,
            _section: &str,
        ) -> Result<String, SheetsError> {
            Err(SheetsError::InvalidUrl)
        }

        fn service_account_email(&self) -> String {
            "bot@project.iam.gserviceaccount.com".to_string()
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
        chat: Arc<RecordingChat>,
        bot: Bot,
    }

    fn fixture(with_analyzer: bool, projects: &[(&str, &str)]) -> Fixture {
        fixture_with_chat(with_analyzer, projects, RecordingChat::default())
    }

    fn fixture_with_chat(
        with_analyzer: bool,
        projects: &[(&str, &str)],
        chat: RecordingChat,
    ) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let store = Arc::new(ProjectStore::open(root.join("data/points.json")).unwrap());
        for (name, id) in projects {
            store.upsert(name, id).unwrap();
        }
        let users = Arc::new(UserStore::open(root.join("data/users.json")).unwrap());
        let local = LocalStorage::new(root.join("excel"), root.join("json"));

        let mut pipeline = Pipeline::new(store.clone(), local, 2);
        if with_analyzer {
            pipeline = pipeline.with_analyzer(Arc::new(FixedAnalyzer));
        }

        let chat = Arc::new(chat);
        let bot = Bot::new(
            chat.clone(),
            pipeline,
            store,
            users,
            BotOptions {
                admin_ids: HashSet::from([1000]),
                temp_dir: root.join("temp"),
                max_file_size: 1024,
            },
        )
        .with_sheets(Arc::new(AllowAll));

        Fixture {
            _dir: dir,
            root,
            chat,
            bot,
        }
    }

    fn update(user_id: i64, body: serde_json::Value) -> Update {
        let mut message = serde_json::json!({
            "message_id": 1,
            "from": {"id": user_id, "is_bot": false, "first_name": "Іван", "username": "ivan"},
            "chat": {"id": user_id},
        });
        for (k, v) in body.as_object().unwrap() {
            message[k] = v.clone();
        }
        serde_json::from_value(serde_json::json!({"update_id": 1, "message": message})).unwrap()
    }

    fn text(user_id: i64, text: &str) -> Update {
        update(user_id, serde_json::json!({ "text": text }))
    }

    fn pdf(user_id: i64, size: u64) -> Update {
        update(
            user_id,
            serde_json::json!({
                "document": {
                    "file_id": "doc-1",
                    "file_name": "invoice.pdf",
                    "mime_type": "application/pdf",
                    "file_size": size
                }
            }),
        )
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn upload_flow_delivers_local_result_and_cleans_up() {
        let f = fixture(true, &[("Склад", "sheet-1")]);

        f.bot.handle_update(text(1, "/analyze")).await;
        assert!(f.chat.last_text().contains("Выбор проекта"));
        f.bot.handle_update(text(1, "Склад")).await;
        assert!(f.chat.last_text().contains("Выбран проект:</b> Склад"));
        f.bot.handle_update(text(1, "📦 Товары")).await;
        assert!(f.chat.last_text().contains("Тип: товары"));

        f.bot.handle_update(pdf(1, 512)).await;

        let sent = f.chat.sent.lock().clone();
        assert!(sent.contains(&Sent::Document {
            file_name: "analysis_77.xlsx".to_string(),
            existed: true
        }));
        let texts = f.chat.texts();
        assert!(texts.iter().any(|t| t.contains("Обрабатываю документ")));
        assert!(texts.iter().any(|t| t.contains("файлы сохранены локально")));
        assert!(f.chat.last_text().contains("Детали по товарам"));

        // Downloaded file and the sent workbook are gone; the JSON stays.
        let downloads = f.chat.downloads.lock().clone();
        assert_eq!(downloads.len(), 1);
        assert!(!downloads[0].exists());
        assert!(dir_is_empty(&f.root.join("temp")));
        assert!(dir_is_empty(&f.root.join("excel")));
        assert!(!dir_is_empty(&f.root.join("json")));

        assert!(!f.bot.sessions.conversation(1).is_processing());
        assert_eq!(f.bot.users.username(1).as_deref(), Some("ivan"));
    }

    #[tokio::test]
    async fn failed_processing_notice_still_runs_and_releases_session() {
        let chat = RecordingChat {
            fail_containing: Some("Обрабатываю"),
            ..Default::default()
        };
        let f = fixture_with_chat(true, &[("Склад", "sheet-1")], chat);
        for msg in ["/analyze", "Склад", "📦 Товары"] {
            f.bot.handle_update(text(6, msg)).await;
        }

        f.bot.handle_update(pdf(6, 512)).await;

        assert!(!f.bot.sessions.conversation(6).is_processing());
        assert_eq!(f.chat.downloads.lock().len(), 1);
        assert!(f.chat.texts().iter().any(|t| t.contains("файлы сохранены локально")));

        f.bot.handle_update(text(6, "/analyze")).await;
        assert!(f.chat.last_text().contains("Выбор проекта"));
    }

    #[tokio::test]
    async fn missing_analyzer_reports_failure() {
        let f = fixture(false, &[("Склад", "sheet-1")]);
        for msg in ["/analyze", "Склад", "🔧 Услуги"] {
            f.bot.handle_update(text(2, msg)).await;
        }
        f.bot.handle_update(pdf(2, 10)).await;

        let last = f.chat.last_text();
        assert!(last.contains("Ошибка при обработке документа"));
        assert!(last.contains("недоступен"));
        assert!(dir_is_empty(&f.root.join("temp")));
    }

    #[tokio::test]
    async fn start_without_projects_explains() {
        let f = fixture(true, &[]);
        f.bot.handle_update(text(3, "📄 Анализ документа")).await;
        assert!(f.chat.last_text().contains("Нет доступных проектов"));
    }

    #[tokio::test]
    async fn oversized_or_textual_uploads_get_format_help() {
        let f = fixture(true, &[("Склад", "sheet-1")]);
        for msg in ["/analyze", "Склад", "📦 Товары"] {
            f.bot.handle_update(text(4, msg)).await;
        }

        f.bot.handle_update(pdf(4, 4096)).await;
        assert!(f.chat.last_text().contains("Поддерживаемые форматы"));
        f.bot.handle_update(text(4, "вот документ")).await;
        assert!(f.chat.last_text().contains("Поддерживаемые форматы"));
        assert!(f.chat.downloads.lock().is_empty());
    }

    #[tokio::test]
    async fn admin_adds_point_after_permission_check() {
        let f = fixture(true, &[]);
        f.bot.handle_update(text(1000, "&addpoint")).await;
        f.bot.handle_update(text(1000, "Объект")).await;

        f.bot.handle_update(text(1000, "forbidden")).await;
        assert!(f.chat.last_text().contains("bot@project.iam.gserviceaccount.com"));
        assert!(!f.bot.projects.contains("Объект"));

        f.bot.handle_update(text(1000, "sheet-42")).await;
        assert!(f.chat.last_text().contains("Успешно"));
        assert_eq!(f.bot.projects.sheet_id("Объект").as_deref(), Some("sheet-42"));

        f.bot.handle_update(text(1000, "&delpoint Объект")).await;
        assert!(f.chat.last_text().contains("удалена"));
        assert!(!f.bot.projects.contains("Объект"));
    }

    #[tokio::test]
    async fn non_admin_cannot_manage_points() {
        let f = fixture(true, &[]);
        f.bot.handle_update(text(5, "&addpoint")).await;
        f.bot.handle_update(text(5, "Объект")).await;
        f.bot.handle_update(text(5, "sheet-1")).await;
        assert!(f.bot.projects.all().is_empty());
        assert!(!f.chat.texts().iter().any(|t| t.contains("имя для новой точки")));
    }

    #[test]
    fn photo_uses_largest_size() {
        let update = update(
            1,
            serde_json::json!({
                "photo": [
                    {"file_id": "s", "file_unique_id": "u1", "width": 90, "height": 90, "file_size": 100},
                    {"file_id": "l", "file_unique_id": "u2", "width": 900, "height": 900, "file_size": 900}
                ]
            }),
        );
        let (input, attachment) = classify(&update.message.unwrap(), 1024);
        assert_eq!(input, Input::Attachment);
        let attachment = attachment.unwrap();
        assert_eq!(attachment.file_id, "l");
        assert_eq!(attachment.file_name, "image_u2.jpg");
        assert_eq!(attachment.kind, AttachmentKind::Image);
    }

    #[test]
    fn image_sent_as_file_gets_an_extension() {
        let update = update(
            1,
            serde_json::json!({
                "document": {"file_id": "d", "file_name": "scan", "mime_type": "image/png"}
            }),
        );
        let (_, attachment) = classify(&update.message.unwrap(), 1024);
        let attachment = attachment.unwrap();
        assert_eq!(attachment.file_name, "scan.png");
        assert_eq!(attachment.kind, AttachmentKind::Image);
    }

    #[test]
    fn unsupported_documents_are_rejected() {
        let update = update(
            1,
            serde_json::json!({
                "document": {"file_id": "d", "file_name": "../archive.zip", "mime_type": "application/zip"}
            }),
        );
        assert_eq!(classify(&update.message.unwrap(), 1024), (Input::Other, None));
        assert_eq!(safe_file_name("../../etc/pass:wd"), "pass_wd");
    }
}
