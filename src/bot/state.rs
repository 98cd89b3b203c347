//! Document upload conversation as an explicit transition table.
//!
//! `transition` is pure: it maps (current state, classified input, known
//! projects) to the next state and the action the handler must perform.
//! Nothing here talks to the chat or the pipeline.

use crate::bot::messages;
use crate::domain::analysis::Category;

/// Where a user is in the upload flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConversationState {
    #[default]
    Idle,
    AwaitingProject,
    AwaitingCategory {
        project: String,
    },
    AwaitingFile {
        project: String,
        category: Category,
    },
    Processing {
        project: String,
        category: Category,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    AwaitingProject,
    AwaitingCategory,
    AwaitingFile,
    Processing,
}

impl ConversationState {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Idle => Stage::Idle,
            Self::AwaitingProject => Stage::AwaitingProject,
            Self::AwaitingCategory { .. } => Stage::AwaitingCategory,
            Self::AwaitingFile { .. } => Stage::AwaitingFile,
            Self::Processing { .. } => Stage::Processing,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Processing { .. })
    }
}

/// Incoming message, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `/analyze` or the analyse button.
    Start,
    /// `/start`.
    Home,
    Cancel,
    Back,
    Text(String),
    /// A photo or a supported-size file.
    Attachment,
    /// Stickers, oversized files and everything else.
    Other,
}

impl Input {
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        match text {
            messages::CMD_ANALYZE | messages::BTN_ANALYZE => Self::Start,
            messages::CMD_START => Self::Home,
            messages::BTN_CANCEL => Self::Cancel,
            messages::BTN_BACK => Self::Back,
            _ if text.starts_with(messages::CMD_ANALYZE)
                && text[messages::CMD_ANALYZE.len()..].starts_with('@') =>
            {
                Self::Start
            }
            _ => Self::Text(text.to_string()),
        }
    }
}

/// What the handler does after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    MainMenu,
    NoProjects,
    AskProject { projects: Vec<String> },
    UnknownProject { projects: Vec<String> },
    AskCategory { project: String },
    UnknownCategory,
    AskFile { project: String, category: Category },
    InvalidFormat,
    StartProcessing { project: String, category: Category },
    PleaseWait,
    Cancelled,
    Ignore,
}

/// Next state and action for `input` in `state`.
pub fn transition(
    state: &ConversationState,
    input: &Input,
    projects: &[String],
) -> (ConversationState, Action) {
    use ConversationState as S;

    if let Input::Cancel = input {
        return (S::Idle, Action::Cancelled);
    }
    if state.is_processing() {
        return (state.clone(), Action::PleaseWait);
    }

    match (state, input) {
        (_, Input::Start) => start(projects),
        (_, Input::Home) => (S::Idle, Action::MainMenu),

        (S::AwaitingCategory { .. }, Input::Back) => start(projects),
        (S::AwaitingFile { project, .. }, Input::Back) => (
            S::AwaitingCategory {
                project: project.clone(),
            },
            Action::AskCategory {
                project: project.clone(),
            },
        ),
        (_, Input::Back) => (S::Idle, Action::MainMenu),

        (S::Idle, Input::Text(_) | Input::Attachment) => (S::Idle, Action::MainMenu),
        (S::Idle, _) => (S::Idle, Action::Ignore),

        (S::AwaitingProject, Input::Text(text)) if projects.iter().any(|p| p == text) => (
            S::AwaitingCategory {
                project: text.clone(),
            },
            Action::AskCategory {
                project: text.clone(),
            },
        ),
        (S::AwaitingProject, _) => (
            S::AwaitingProject,
            Action::UnknownProject {
                projects: projects.to_vec(),
            },
        ),

        (S::AwaitingCategory { project }, Input::Text(text)) => {
            match messages::category_from_button(text) {
                Some(category) => (
                    S::AwaitingFile {
                        project: project.clone(),
                        category,
                    },
                    Action::AskFile {
                        project: project.clone(),
                        category,
                    },
                ),
                None => (state.clone(), Action::UnknownCategory),
            }
        }
        (S::AwaitingCategory { .. }, _) => (state.clone(), Action::UnknownCategory),

        (S::AwaitingFile { project, category }, Input::Attachment) => (
            S::Processing {
                project: project.clone(),
                category: *category,
            },
            Action::StartProcessing {
                project: project.clone(),
                category: *category,
            },
        ),
        (S::AwaitingFile { .. }, _) => (state.clone(), Action::InvalidFormat),

        (S::Processing { .. }, _) => (state.clone(), Action::PleaseWait),
    }
}

fn start(projects: &[String]) -> (ConversationState, Action) {
    if projects.is_empty() {
        (ConversationState::Idle, Action::NoProjects)
    } else {
        (
            ConversationState::AwaitingProject,
            Action::AskProject {
                projects: projects.to_vec(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projects() -> Vec<String> {
        vec!["Склад-1".to_string(), "Объект Альфа".to_string()]
    }

    fn awaiting_file() -> ConversationState {
        ConversationState::AwaitingFile {
            project: "Склад-1".to_string(),
            category: Category::Jobs,
        }
    }

    fn processing() -> ConversationState {
        ConversationState::Processing {
            project: "Склад-1".to_string(),
            category: Category::Jobs,
        }
    }

    #[test]
    fn happy_path_reaches_processing() {
        let projects = projects();
        let (s, a) = transition(&ConversationState::Idle, &Input::Start, &projects);
        assert_eq!(s, ConversationState::AwaitingProject);
        assert_eq!(a, Action::AskProject { projects: projects.clone() });

        let (s, a) = transition(&s, &Input::Text("Склад-1".into()), &projects);
        assert_eq!(s.stage(), Stage::AwaitingCategory);
        assert!(matches!(a, Action::AskCategory { .. }));

        let (s, a) = transition(&s, &Input::from_text("🔧 Услуги"), &projects);
        assert_eq!(s, awaiting_file());
        assert!(matches!(a, Action::AskFile { category: Category::Jobs, .. }));

        let (s, a) = transition(&s, &Input::Attachment, &projects);
        assert_eq!(s, processing());
        assert_eq!(
            a,
            Action::StartProcessing {
                project: "Склад-1".to_string(),
                category: Category::Jobs
            }
        );
    }

    #[test]
    fn start_without_projects_stays_idle() {
        let (s, a) = transition(&ConversationState::Idle, &Input::Start, &[]);
        assert_eq!(s, ConversationState::Idle);
        assert_eq!(a, Action::NoProjects);
    }

    #[test]
    fn unknown_choices_reprompt_without_moving() {
        let projects = projects();
        let (s, a) = transition(
            &ConversationState::AwaitingProject,
            &Input::Text("Склад-2".into()),
            &projects,
        );
        assert_eq!(s, ConversationState::AwaitingProject);
        assert_eq!(a, Action::UnknownProject { projects });

        let category = ConversationState::AwaitingCategory {
            project: "Склад-1".into(),
        };
        let (s, a) = transition(&category, &Input::Text("Материалы".into()), &[]);
        assert_eq!(s, category);
        assert_eq!(a, Action::UnknownCategory);
    }

    #[test]
    fn non_attachment_while_awaiting_file_is_rejected() {
        for input in [Input::Text("вот файл".into()), Input::Other] {
            let (s, a) = transition(&awaiting_file(), &input, &projects());
            assert_eq!(s, awaiting_file());
            assert_eq!(a, Action::InvalidFormat);
        }
    }

    #[test]
    fn back_steps_one_stage() {
        let projects = projects();
        let (s, a) = transition(&awaiting_file(), &Input::Back, &projects);
        assert_eq!(
            s,
            ConversationState::AwaitingCategory {
                project: "Склад-1".into()
            }
        );
        assert!(matches!(a, Action::AskCategory { .. }));

        let (s, _) = transition(&s, &Input::Back, &projects);
        assert_eq!(s, ConversationState::AwaitingProject);

        let (s, a) = transition(&s, &Input::Back, &projects);
        assert_eq!(s, ConversationState::Idle);
        assert_eq!(a, Action::MainMenu);
    }

    #[test]
    fn processing_only_yields_to_cancel() {
        for input in [
            Input::Start,
            Input::Back,
            Input::Home,
            Input::Attachment,
            Input::Text("?".into()),
            Input::Other,
        ] {
            let (s, a) = transition(&processing(), &input, &projects());
            assert_eq!(s, processing());
            assert_eq!(a, Action::PleaseWait);
        }

        let (s, a) = transition(&processing(), &Input::Cancel, &projects());
        assert_eq!(s, ConversationState::Idle);
        assert_eq!(a, Action::Cancelled);
    }

    #[test]
    fn cancel_clears_every_stage() {
        let states = [
            ConversationState::Idle,
            ConversationState::AwaitingProject,
            ConversationState::AwaitingCategory {
                project: "x".into(),
            },
            awaiting_file(),
        ];
        for state in states {
            assert_eq!(
                transition(&state, &Input::Cancel, &projects()),
                (ConversationState::Idle, Action::Cancelled)
            );
        }
    }

    #[test]
    fn text_is_classified() {
        assert_eq!(Input::from_text("/analyze"), Input::Start);
        assert_eq!(Input::from_text("/analyze@invoice_bot"), Input::Start);
        assert_eq!(Input::from_text("📄 Анализ документа"), Input::Start);
        assert_eq!(Input::from_text("/start"), Input::Home);
        assert_eq!(Input::from_text(" 🚫 Отмена "), Input::Cancel);
        assert_eq!(Input::from_text("◀️Назад"), Input::Back);
        assert_eq!(Input::from_text(" Склад-1 "), Input::Text("Склад-1".into()));
    }
}
