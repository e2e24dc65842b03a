pub mod orchestrator;
pub mod registry;

use crate::credentials::CredentialStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationState {
    /// No language model key yet
    Idle,
    /// Key present, greeting not delivered
    AwaitingInput,
    Conversing,
}

/// All state of one user visit. Lives in memory only.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    credentials: CredentialStore,
    turns: Vec<Turn>,
    input_history: Vec<String>,
    pending_query: Option<String>,
    greeted: bool,
    greeting_failures: u32,
    last_active: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            credentials: CredentialStore::default(),
            turns: Vec::new(),
            input_history: Vec::new(),
            pending_query: None,
            greeted: false,
            greeting_failures: 0,
            last_active: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn credentials_mut(&mut self) -> &mut CredentialStore {
        &mut self.credentials
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn input_history(&self) -> &[String] {
        &self.input_history
    }

    pub fn pending_query(&self) -> Option<&str> {
        self.pending_query.as_deref()
    }

    pub fn greeted(&self) -> bool {
        self.greeted
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Greeting attempts are capped; once exhausted the session converses without one.
    pub fn state(&self, max_greeting_attempts: u32) -> ConversationState {
        if self.credentials.api_key().is_none() {
            ConversationState::Idle
        } else if self.greeted || self.greeting_failures >= max_greeting_attempts {
            ConversationState::Conversing
        } else {
            ConversationState::AwaitingInput
        }
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub(crate) fn record_utterance(&mut self, utterance: &str) {
        self.input_history.push(utterance.to_string());
    }

    pub(crate) fn restart_from(&mut self, utterance: &str) {
        self.turns = vec![Turn::user(utterance)];
    }

    pub(crate) fn set_pending_query(&mut self, sql: String) {
        self.pending_query = Some(sql);
    }

    pub(crate) fn mark_greeted(&mut self) {
        self.greeted = true;
        self.greeting_failures = 0;
    }

    pub(crate) fn record_greeting_failure(&mut self) -> u32 {
        self.greeting_failures += 1;
        self.greeting_failures
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Forgets the conversation but keeps the credentials.
    pub(crate) fn clear(&mut self) {
        self.turns.clear();
        self.input_history.clear();
        self.pending_query = None;
        self.greeted = false;
        self.greeting_failures = 0;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::service_account_json;

    #[test]
    fn state_follows_key_and_greeting() {
        let mut session = Session::new();
        assert_eq!(session.state(3), ConversationState::Idle);

        session.credentials_mut().set_api_key("key");
        assert_eq!(session.state(3), ConversationState::AwaitingInput);

        session.mark_greeted();
        assert_eq!(session.state(3), ConversationState::Conversing);

        session.credentials_mut().set_api_key("");
        assert_eq!(session.state(3), ConversationState::Idle);
    }

    #[test]
    fn exhausted_greeting_attempts_allow_conversation() {
        let mut session = Session::new();
        session.credentials_mut().set_api_key("key");

        assert_eq!(session.record_greeting_failure(), 1);
        assert_eq!(session.state(2), ConversationState::AwaitingInput);
        session.record_greeting_failure();
        assert_eq!(session.state(2), ConversationState::Conversing);
        assert!(!session.greeted());
    }

    #[test]
    fn clear_resets_conversation_but_keeps_credentials() {
        let mut session = Session::new();
        session.credentials_mut().set_api_key("key");
        session
            .credentials_mut()
            .upload_service_account(service_account_json().as_bytes())
            .unwrap();
        session.push_turn(Turn::assistant("Hello"));
        session.push_turn(Turn::user("How many stores?"));
        session.record_utterance("How many stores?");
        session.set_pending_query("SELECT COUNT(DISTINCT StoreId) FROM t".into());
        session.mark_greeted();

        session.clear();

        assert!(session.turns().is_empty());
        assert!(session.input_history().is_empty());
        assert!(!session.greeted());
        assert_eq!(session.pending_query(), None);
        assert!(session.credentials().api_key().is_some());
        assert!(session.credentials().service_account().is_some());
        assert_eq!(session.state(3), ConversationState::AwaitingInput);
    }

    #[test]
    fn turns_serialize_with_lowercase_roles() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "text": "hi"}));
    }
}
