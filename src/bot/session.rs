//! Per-user conversation state.

use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use crate::bot::admin::{self, AdminAction, AdminInput, AdminState};
use crate::bot::state::{self, Action, ConversationState, Input};

#[derive(Debug, Default)]
struct Session {
    conversation: ConversationState,
    admin: AdminState,
    /// Identifies the processing run a result belongs to. Cleared when the
    /// user leaves `Processing`, so a late result no longer matches.
    ticket: Option<Uuid>,
}

impl Session {
    fn is_idle(&self) -> bool {
        self.conversation == ConversationState::Idle
            && self.admin == AdminState::Idle
            && self.ticket.is_none()
    }
}

/// Drop the entry of a user with nothing in flight.
fn prune(sessions: &mut HashMap<i64, Session>, user_id: i64) {
    if sessions.get(&user_id).is_some_and(Session::is_idle) {
        sessions.remove(&user_id);
    }
}

/// Outcome of feeding one input into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub action: Action,
    /// Set when this step started a processing run.
    pub ticket: Option<Uuid>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation(&self, user_id: i64) -> ConversationState {
        self.sessions
            .lock()
            .get(&user_id)
            .map(|s| s.conversation.clone())
            .unwrap_or_default()
    }

    /// Apply `input` to the user's conversation in one critical section.
    pub fn advance(&self, user_id: i64, input: &Input, projects: &[String]) -> Step {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(user_id).or_default();

        let was_processing = session.conversation.is_processing();
        let (next, action) = state::transition(&session.conversation, input, projects);

        let ticket = match (was_processing, next.is_processing()) {
            (false, true) => {
                let ticket = Uuid::new_v4();
                session.ticket = Some(ticket);
                Some(ticket)
            }
            (_, false) => {
                session.ticket = None;
                None
            }
            (true, true) => None,
        };
        session.conversation = next;
        prune(&mut sessions, user_id);

        Step { action, ticket }
    }

    /// End a processing run. False when the run was cancelled (or replaced)
    /// and its result must be discarded.
    pub fn finish(&self, user_id: i64, ticket: Uuid) -> bool {
        let mut sessions = self.sessions.lock();
        let finished = match sessions.get_mut(&user_id) {
            Some(session) if session.ticket == Some(ticket) => {
                session.ticket = None;
                session.conversation = ConversationState::Idle;
                true
            }
            _ => false,
        };
        prune(&mut sessions, user_id);
        finished
    }

    pub fn advance_admin(&self, user_id: i64, input: &AdminInput) -> AdminAction {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(user_id).or_default();
        let (next, action) = admin::transition(&session.admin, input);
        session.admin = next;
        prune(&mut sessions, user_id);
        action
    }

    pub fn reset_admin(&self, user_id: i64) {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get_mut(&user_id) {
            session.admin = AdminState::Idle;
        }
        prune(&mut sessions, user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::Category;

    fn to_processing(store: &SessionStore, user: i64) -> Uuid {
        let projects = vec!["obj".to_string()];
        store.advance(user, &Input::Start, &projects);
        store.advance(user, &Input::Text("obj".into()), &projects);
        store.advance(user, &Input::Text("📦 Товары".into()), &projects);
        let step = store.advance(user, &Input::Attachment, &projects);
        assert!(matches!(
            step.action,
            Action::StartProcessing {
                category: Category::Materials,
                ..
            }
        ));
        step.ticket.unwrap()
    }

    #[test]
    fn finished_run_returns_to_idle() {
        let store = SessionStore::new();
        let ticket = to_processing(&store, 1);

        assert!(store.conversation(1).is_processing());
        assert!(store.finish(1, ticket));
        assert_eq!(store.conversation(1), ConversationState::Idle);
    }

    #[test]
    fn cancelled_run_result_is_discarded() {
        let store = SessionStore::new();
        let ticket = to_processing(&store, 1);

        let step = store.advance(1, &Input::Cancel, &[]);
        assert_eq!(step.action, Action::Cancelled);
        assert!(!store.finish(1, ticket));

        // A new run after the cancel gets its own ticket.
        let second = to_processing(&store, 1);
        assert_ne!(ticket, second);
        assert!(!store.finish(1, ticket));
        assert!(store.finish(1, second));
    }

    #[test]
    fn waiting_messages_keep_the_ticket() {
        let store = SessionStore::new();
        let ticket = to_processing(&store, 7);

        let step = store.advance(7, &Input::Text("ну что там?".into()), &[]);
        assert_eq!(step.action, Action::PleaseWait);
        assert_eq!(step.ticket, None);
        assert!(store.finish(7, ticket));
    }

    #[test]
    fn sessions_are_independent() {
        let store = SessionStore::new();
        let ticket = to_processing(&store, 1);
        store.advance(2, &Input::Cancel, &[]);

        assert!(store.conversation(1).is_processing());
        assert!(store.finish(1, ticket));
    }

    #[test]
    fn idle_users_are_not_retained() {
        let store = SessionStore::new();
        store.advance(3, &Input::Text("привет".into()), &[]);
        store.advance(4, &Input::Start, &["obj".to_string()]);
        assert_eq!(store.sessions.lock().len(), 1);

        let ticket = to_processing(&store, 5);
        assert!(store.finish(5, ticket));
        store.advance(4, &Input::Cancel, &[]);
        assert!(store.sessions.lock().is_empty());

        store.advance_admin(6, &AdminInput::AddPoint);
        store.advance(6, &Input::Cancel, &[]);
        assert_eq!(store.sessions.lock().len(), 1);
        store.reset_admin(6);
        assert!(store.sessions.lock().is_empty());
    }

    #[test]
    fn admin_state_is_tracked_separately() {
        let store = SessionStore::new();
        assert_eq!(
            store.advance_admin(5, &AdminInput::AddPoint),
            AdminAction::AskPointName
        );
        assert_eq!(store.conversation(5), ConversationState::Idle);
        assert_eq!(
            store.advance_admin(5, &AdminInput::Text("obj".into())),
            AdminAction::AskSheetId {
                point_name: "obj".into()
            }
        );

        store.reset_admin(5);
        assert_eq!(
            store.advance_admin(5, &AdminInput::Text("sheet".into())),
            AdminAction::NotHandled
        );
    }
}
