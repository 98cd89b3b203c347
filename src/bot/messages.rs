//! User-facing texts, button labels and keyboards.

use crate::domain::analysis::{Category, DocumentAnalysis, ExtendedItem, ProcessingResult};
use crate::domain::attachment::AttachmentKind;
use crate::telegram::types::ReplyMarkup;

// ============================================================================
// Buttons and commands
// ============================================================================

pub const CMD_ANALYZE: &str = "/analyze";
pub const CMD_START: &str = "/start";
pub const BTN_ANALYZE: &str = "📄 Анализ документа";
pub const BTN_CANCEL: &str = "🚫 Отмена";
pub const BTN_BACK: &str = "◀️Назад";
pub const BTN_GOODS: &str = "📦 Товары";
pub const BTN_JOBS: &str = "🔧 Услуги";

pub const CMD_ADD_POINT: &str = "&addpoint";
pub const CMD_DELETE_POINT: &str = "&delpoint";
pub const CMD_LIST_POINTS: &str = "&points";
pub const BTN_ADMIN_CANCEL: &str = "❌ Отмена";
pub const BTN_RENAME_POINT: &str = "✍️ Изменить имя точки";

/// Category selected by a category button.
pub fn category_from_button(text: &str) -> Option<Category> {
    match text {
        BTN_GOODS => Some(Category::Materials),
        BTN_JOBS => Some(Category::Jobs),
        _ => None,
    }
}

// ============================================================================
// Keyboards
// ============================================================================

pub fn main_menu() -> ReplyMarkup {
    ReplyMarkup::rows([[BTN_ANALYZE]])
}

/// Projects two per row, cancel on its own row.
pub fn project_menu(projects: &[String]) -> ReplyMarkup {
    let mut rows: Vec<Vec<String>> = projects.chunks(2).map(|c| c.to_vec()).collect();
    rows.push(vec![BTN_CANCEL.to_string()]);
    ReplyMarkup::rows(rows)
}

pub fn category_menu() -> ReplyMarkup {
    ReplyMarkup::rows([vec![BTN_GOODS, BTN_JOBS], vec![BTN_CANCEL]])
}

pub fn back_and_cancel() -> ReplyMarkup {
    ReplyMarkup::rows([[BTN_BACK], [BTN_CANCEL]])
}

pub fn cancel_only() -> ReplyMarkup {
    ReplyMarkup::rows([[BTN_CANCEL]])
}

pub fn admin_cancel_menu() -> ReplyMarkup {
    ReplyMarkup::rows([[BTN_ADMIN_CANCEL]])
}

pub fn sheet_id_input_menu() -> ReplyMarkup {
    ReplyMarkup::rows([[BTN_RENAME_POINT, BTN_ADMIN_CANCEL]])
}

// ============================================================================
// Conversation texts
// ============================================================================

pub const MAIN_MENU: &str = "📄 <b>Анализ документов</b>\n\n\
    Нажмите «📄 Анализ документа» или отправьте команду /analyze, \
    чтобы загрузить накладную или акт.";

pub const NO_PROJECTS: &str = "❌ <b>Нет доступных проектов</b>\n\n\
    Обратитесь к администратору для настройки проектов.";

pub const CHOOSE_PROJECT: &str = "🏗️ <b>Выбор проекта</b>\n\n\
    Выберите проект, к которому относится документ для анализа:";

pub const UNKNOWN_PROJECT: &str =
    "❌ Неверный выбор проекта. Пожалуйста, выберите из предложенных вариантов:";

pub const UNKNOWN_CATEGORY: &str =
    "❌ Неверный выбор типа документа. Пожалуйста, выберите из предложенных вариантов:";

pub const INVALID_FORMAT: &str = "❌ Пожалуйста, отправьте документ файлом или изображением.\n\n\
    📄 <b>Поддерживаемые форматы:</b>\n\
    • Изображения: JPG, JPEG, PNG, GIF, BMP, WEBP\n\
    • Документы: PDF, DOCX\n\n\
    💡 <b>Способы отправки:</b>\n\
    • Как фото (сжатое) - для быстрой обработки\n\
    • Как файл (без сжатия) - для лучшего качества";

pub const PLEASE_WAIT: &str = "⏳ <b>Документ обрабатывается...</b>\n\n\
    Пожалуйста, подождите завершения обработки.\n\
    Для отмены нажмите кнопку 'Отмена'.";

pub const CANCELLED: &str = "🚫 <b>Обработка отменена</b>\n\n\
    Вы можете начать заново, отправив команду /analyze";

pub const DOWNLOAD_FAILED: &str = "Не удалось загрузить файл из чата";
pub const EXCEL_SEND_FAILED: &str = "❌ Не удалось отправить Excel файл";
pub const EXCEL_CAPTION: &str = "📊 Excel таблица с результатами анализа";

pub fn category_prompt(project: &str) -> String {
    format!(
        "✅ <b>Выбран проект:</b> {}\n\n📋 <b>Тип документа</b>\n\n\
         Выберите, что описывает предоставляемый документ:",
        escape_html(project)
    )
}

pub fn file_prompt(project: &str, category: Category) -> String {
    format!(
        "✅ <b>Настройки анализа:</b>\n🏗️ Проект: {}\n📋 Тип: {}\n\n\
         📄 <b>Отправьте документ или фото для анализа</b>\n\n\
         После обработки вы получите ссылку на итоговый документ",
        escape_html(project),
        category.label()
    )
}

pub fn processing_notice(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::Image => {
            "⏳ <b>Анализирую изображение ...</b>\n\n\
             Это может занять несколько минут.\nПожалуйста, подождите."
        }
        AttachmentKind::Document => {
            "⏳ <b>Обрабатываю документ...</b>\n\n\
             Это может занять несколько минут.\nПожалуйста, подождите."
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// First message after a successful run.
pub fn success_summary(result: &ProcessingResult, analysis: &DocumentAnalysis<ExtendedItem>) -> String {
    let mut text = String::from("✅ <b>Документ успешно обработан!</b>\n");
    if result.is_local_processing {
        text.push_str("⚠️ <i>Google сервисы недоступны, файлы сохранены локально</i>\n");
    }
    text.push('\n');
    text.push_str(&document_summary(analysis));
    text.push_str("\n\n");
    text.push_str(&format!("📦 Товаров: {} шт.", analysis.items.len()));
    if analysis.total_amount > 0.0 {
        text.push_str(&format!(
            "\n💰 Общая сумма: {} грн.",
            format_amount(analysis.total_amount)
        ));
    }
    text.push_str("\n\n");

    match &result.google_sheet_url {
        Some(url) if !result.is_local_processing => {
            text.push_str("📊 <b>Данные добавлены в общую таблицу:</b>\n");
            text.push_str(&format!(
                "• <a href='{}'>Посмотреть таблицу</a>",
                escape_html(url)
            ));
        }
        _ => {
            text.push_str("📊 <b>Результаты:</b>\n• Excel таблица (отправляется файлом)");
        }
    }
    text
}

fn document_summary(analysis: &DocumentAnalysis<ExtendedItem>) -> String {
    let mut lines = Vec::new();
    if !analysis.document_type.trim().is_empty() {
        lines.push(format!("📋 Тип: {}", escape_html(&analysis.document_type)));
    }
    let optional = [
        ("📄 Номер", &analysis.document_number),
        ("📅 Дата", &analysis.date),
        ("🏢 Поставщик", &analysis.supplier),
        ("🏪 Покупатель", &analysis.customer),
    ];
    for (label, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            lines.push(format!("{label}: {}", escape_html(value)));
        }
    }

    if lines.is_empty() {
        "Основная информация не распознана".to_string()
    } else {
        lines.join("\n")
    }
}

/// Message size limit of the Bot API, counted in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;
/// Longest item name shown in the breakdown, in characters.
const MAX_ITEM_NAME_CHARS: usize = 300;

/// Per-item breakdown split into messages that fit `MAX_MESSAGE_LEN`.
/// Empty for a document without items. Items are never split across messages.
pub fn item_details(analysis: &DocumentAnalysis<ExtendedItem>) -> Vec<String> {
    let header = "📋 <b>Детали по товарам:</b>\n\n";
    let mut chunks = Vec::new();
    let mut current = String::from(header);

    for (idx, item) in analysis.items.iter().enumerate() {
        let block = item_block(idx + 1, item);
        if current != header && utf16_len(&current) + utf16_len(&block) > MAX_MESSAGE_LEN {
            chunks.push(current.trim_end().to_string());
            current = String::new();
        }
        current.push_str(&block);
    }
    if !analysis.items.is_empty() {
        chunks.push(current.trim_end().to_string());
    }
    chunks
}

fn item_block(number: usize, item: &ExtendedItem) -> String {
    let name: String = item.name.chars().take(MAX_ITEM_NAME_CHARS).collect();
    let mut block = format!(
        "{}. <b>{}</b>\n   Количество: {} {}\n   Цена: {} грн.\n   Сумма: {} грн.\n",
        number,
        escape_html(&name),
        format_amount(item.quantity),
        escape_html(item.unit_or_default()),
        format_amount(item.price),
        format_amount(item.total),
    );
    if let Some(avg) = item.average_market_price {
        block.push_str(&format!("   Рыночная цена: ~{} грн.", format_amount(avg)));
        if let Some(min) = item.min_market_price {
            block.push_str(&format!(" (мин. {} грн.)", format_amount(min)));
        }
        block.push('\n');
    } else if let Some(min) = item.min_market_price {
        block.push_str(&format!("   Мин. рыночная цена: {} грн.\n", format_amount(min)));
    }
    block.push('\n');
    block
}

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

pub fn failure(reason: Option<&str>) -> String {
    format!(
        "❌ <b>Ошибка при обработке документа</b>\n\n\
         Причина: {}\n\n\
         Попробуйте:\n\
         • Загрузить документ лучшего качества\n\
         • Проверить формат файла\n\
         • Повторить попытку позже",
        escape_html(reason.unwrap_or("Неизвестная ошибка"))
    )
}

/// Name the workbook is sent under.
pub fn excel_file_name(analysis: &DocumentAnalysis<ExtendedItem>) -> String {
    let number = analysis
        .document_number
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("document");
    format!("analysis_{number}.xlsx")
}

// ============================================================================
// Admin texts
// ============================================================================

pub const ASK_POINT_NAME: &str =
    "Введите имя для новой точки (например, 'склад_1' или 'объект_альфа').";
pub const ASK_NEW_POINT_NAME: &str = "Введите новое имя для точки.";
pub const CHECKING_ACCESS: &str = "Проверяю доступ к таблице...";
pub const ADMIN_CANCELLED: &str = "Действие отменено.";
pub const SHEETS_NOT_CONFIGURED: &str = "❌ <b>Google таблицы недоступны</b>\n\n\
    Проверьте файл учетных данных сервисного аккаунта и попробуйте снова.";
pub const DELETE_POINT_USAGE: &str = "Использование: <code>&amp;delpoint имя_точки</code>";
pub const NO_POINTS: &str = "Точки не настроены. Добавьте первую командой <code>&amp;addpoint</code>.";

pub fn ask_sheet_id(point_name: &str) -> String {
    format!(
        "Отлично, имя точки: <b>{}</b>.\n\nТеперь отправьте ID Google таблицы для отчетов.",
        escape_html(point_name)
    )
}

pub fn access_denied(service_account: &str) -> String {
    format!(
        "❌ <b>Ошибка доступа!</b>\n\n\
         Не удалось получить права на запись в таблицу с указанным ID. Убедитесь, что:\n\
         1. ID таблицы скопирован верно.\n\
         2. В таблице есть листы «materials» и «jobs».\n\
         3. Вы предоставили доступ на редактирование для сервисного аккаунта:\n\n\
         <code>{}</code>\n\n\
         Пожалуйста, проверьте и отправьте ID еще раз или отмените операцию.",
        escape_html(service_account)
    )
}

pub fn point_saved(point_name: &str, sheet_id: &str) -> String {
    format!(
        "✅ <b>Успешно!</b>\n\nТочка '<b>{}</b>' успешно связана с таблицей.\nID таблицы: <code>{}</code>",
        escape_html(point_name),
        escape_html(sheet_id)
    )
}

pub fn store_failed(reason: &str) -> String {
    format!(
        "❌ Не удалось сохранить изменения точек.\n\nПричина: {}",
        escape_html(reason)
    )
}

pub fn point_deleted(point_name: &str, existed: bool) -> String {
    if existed {
        format!("✅ Точка '<b>{}</b>' удалена.", escape_html(point_name))
    } else {
        format!("❌ Точка '<b>{}</b>' не найдена.", escape_html(point_name))
    }
}

pub fn points_list<'a>(points: impl IntoIterator<Item = (&'a String, &'a String)>) -> String {
    let lines: Vec<String> = points
        .into_iter()
        .map(|(name, id)| format!("• {} → <code>{}</code>", escape_html(name), escape_html(id)))
        .collect();
    if lines.is_empty() {
        NO_POINTS.to_string()
    } else {
        format!("📍 <b>Точки:</b>\n\n{}", lines.join("\n"))
    }
}

// ============================================================================
// Formatting helpers
// ============================================================================

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

/// Whole numbers without decimals, everything else with two.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
