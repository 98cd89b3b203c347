//! Administrator flow for managing project (point) mappings.
//!
//! Only users on the allow-list reach this module; the handler routes their
//! text here first and falls back to the upload conversation on `NotHandled`.

use crate::bot::messages;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AdminState {
    #[default]
    Idle,
    AwaitingPointName,
    AwaitingSheetId {
        point_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminInput {
    AddPoint,
    DeletePoint(String),
    ListPoints,
    Rename,
    Cancel,
    Text(String),
}

impl AdminInput {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text {
            messages::CMD_ADD_POINT => Self::AddPoint,
            messages::CMD_LIST_POINTS => Self::ListPoints,
            messages::BTN_RENAME_POINT => Self::Rename,
            messages::BTN_ADMIN_CANCEL => Self::Cancel,
            _ => match text.strip_prefix(messages::CMD_DELETE_POINT) {
                Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
                    Self::DeletePoint(rest.trim().to_string())
                }
                _ => Self::Text(text.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    AskPointName,
    AskNewPointName,
    AskSheetId { point_name: String },
    /// Probe the sheet; on success save the mapping and return to idle.
    VerifySheet { point_name: String, sheet_id: String },
    DeletePoint(String),
    ListPoints,
    Cancelled,
    /// Not an admin message; let the upload conversation have it.
    NotHandled,
}

pub fn transition(state: &AdminState, input: &AdminInput) -> (AdminState, AdminAction) {
    use AdminState as S;

    match (state, input) {
        (_, AdminInput::AddPoint) => (S::AwaitingPointName, AdminAction::AskPointName),
        (_, AdminInput::ListPoints) => (state.clone(), AdminAction::ListPoints),
        (_, AdminInput::DeletePoint(name)) => (state.clone(), AdminAction::DeletePoint(name.clone())),

        (S::Idle, _) => (S::Idle, AdminAction::NotHandled),

        (_, AdminInput::Cancel) => (S::Idle, AdminAction::Cancelled),
        (_, AdminInput::Rename) => (S::AwaitingPointName, AdminAction::AskNewPointName),

        (S::AwaitingPointName, AdminInput::Text(name)) if name.is_empty() => {
            (S::AwaitingPointName, AdminAction::AskPointName)
        }
        (S::AwaitingPointName, AdminInput::Text(name)) => (
            S::AwaitingSheetId {
                point_name: name.clone(),
            },
            AdminAction::AskSheetId {
                point_name: name.clone(),
            },
        ),
        (S::AwaitingSheetId { point_name }, AdminInput::Text(sheet_id)) => (
            state.clone(),
            AdminAction::VerifySheet {
                point_name: point_name.clone(),
                sheet_id: sheet_id.clone(),
            },
        ),
    }
}
