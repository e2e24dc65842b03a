use crate::credentials::CredentialError;
use crate::llm::LanguageModel;
use crate::session::{ConversationState, Session, Turn};
use crate::sql::{GenerationError, QuerySynthesizer, sanitize};
use crate::warehouse::{ExecutionError, QueryResult, WarehouseGateway};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A single user interaction with the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Re-render without new input
    Refresh,
    SetApiKey(String),
    UploadServiceAccount(Vec<u8>),
    Submit(String),
    /// 1-based position in the input history
    Replay(usize),
    Clear,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("There is no history entry number {0}")]
    UnknownHistoryEntry(usize),
}

/// What one render pass leaves on screen.
#[derive(Debug, Serialize)]
pub struct RenderOutcome {
    pub session_id: Uuid,
    pub state: ConversationState,
    pub turns: Vec<Turn>,
    pub input_history: Vec<String>,
    pub pending_query: Option<String>,
    pub has_service_account: bool,
    pub has_api_key: bool,
    pub result: Option<QueryResult>,
    pub notices: Vec<String>,
    pub errors: Vec<String>,
}

/// Drives one session through greeting, synthesis and execution.
///
/// Holds no session data itself; every operation takes the session it acts on.
pub struct Orchestrator<'a> {
    llm: &'a dyn LanguageModel,
    warehouse: &'a dyn WarehouseGateway,
    synthesizer: &'a QuerySynthesizer,
    max_greeting_attempts: u32,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        llm: &'a dyn LanguageModel,
        warehouse: &'a dyn WarehouseGateway,
        synthesizer: &'a QuerySynthesizer,
        max_greeting_attempts: u32,
    ) -> Self {
        Self {
            llm,
            warehouse,
            synthesizer,
            max_greeting_attempts,
        }
    }

    pub fn state(&self, session: &Session) -> ConversationState {
        session.state(self.max_greeting_attempts)
    }

    /// Delivers the greeting once per conversation. Returns whether a greeting was added.
    pub async fn greet_if_needed(&self, session: &mut Session) -> Result<bool, OrchestratorError> {
        if self.state(session) != ConversationState::AwaitingInput {
            return Ok(false);
        }
        let api_key = session.credentials().require_api_key()?.clone();

        match self.synthesizer.greet(self.llm, &api_key).await {
            Ok(greeting) => {
                session.push_turn(Turn::assistant(greeting));
                session.mark_greeted();
                info!(session = %session.id(), "Greeting delivered");
                Ok(true)
            }
            Err(e) => {
                let attempts = session.record_greeting_failure();
                if attempts >= self.max_greeting_attempts {
                    warn!(
                        session = %session.id(),
                        "Greeting failed {} times, continuing without one",
                        attempts
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Records the utterance and, on success, the assistant reply and its SQL.
    pub async fn submit(&self, session: &mut Session, utterance: &str) -> Result<(), OrchestratorError> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Ok(());
        }
        let api_key = session.credentials().require_api_key()?.clone();

        session.push_turn(Turn::user(utterance));
        session.record_utterance(utterance);

        let raw = self
            .synthesizer
            .synthesize(self.llm, &api_key, utterance)
            .await?;
        self.accept(session, raw);
        Ok(())
    }

    /// Restarts the conversation from an earlier utterance.
    pub async fn replay(&self, session: &mut Session, index: usize) -> Result<(), OrchestratorError> {
        let utterance = index
            .checked_sub(1)
            .and_then(|i| session.input_history().get(i))
            .cloned()
            .ok_or(OrchestratorError::UnknownHistoryEntry(index))?;
        let api_key = session.credentials().require_api_key()?.clone();

        info!(session = %session.id(), "Replaying history entry {}", index);
        session.restart_from(&utterance);

        let raw = self
            .synthesizer
            .synthesize(self.llm, &api_key, &utterance)
            .await?;
        self.accept(session, raw);
        Ok(())
    }

    pub fn clear(&self, session: &mut Session) {
        info!(session = %session.id(), "Clearing conversation");
        session.clear();
    }

    /// Runs the pending query, if any. Called on every render pass.
    pub async fn execute_pending(
        &self,
        session: &Session,
    ) -> Option<Result<QueryResult, OrchestratorError>> {
        let sql = sanitize(session.pending_query()?);
        if sql.is_empty() {
            debug!(session = %session.id(), "Pending query is empty, nothing to run");
            return None;
        }

        let credential = match session.credentials().require_service_account() {
            Ok(credential) => credential,
            Err(e) => return Some(Err(e.into())),
        };

        Some(
            self.warehouse
                .execute(credential, &sql)
                .await
                .map_err(OrchestratorError::from),
        )
    }

    /// One full interaction pass: apply the action, greet, synthesize, execute.
    pub async fn render(&self, session: &mut Session, action: Action) -> RenderOutcome {
        session.touch();
        let mut notices = Vec::new();
        let mut errors = Vec::new();

        let mut replay = None;
        let utterance = match action {
            Action::Submit(utterance) => Some(utterance),
            Action::Refresh => None,
            Action::SetApiKey(raw) => {
                session.credentials_mut().set_api_key(&raw);
                None
            }
            Action::UploadServiceAccount(bytes) => {
                match session.credentials_mut().upload_service_account(&bytes) {
                    Ok(_) => notices
                        .push("Google Service Account Key file uploaded successfully!".to_string()),
                    Err(e) => errors.push(e.to_string()),
                }
                None
            }
            Action::Clear => {
                self.clear(session);
                None
            }
            // Applied after the greeting so the restart discards it
            Action::Replay(index) => {
                replay = Some(index);
                None
            }
        };

        let mut result = None;
        if self.state(session) == ConversationState::Idle {
            if utterance.is_some() {
                errors.push(CredentialError::MissingApiKey.to_string());
            }
            if let Some(index) = replay {
                self.replay_or_report(session, index, &mut errors).await;
            }
        } else {
            if let Err(e) = self.greet_if_needed(session).await {
                error!(session = %session.id(), "Greeting failed: {}", e);
                errors.push(match e {
                    OrchestratorError::Generation(GenerationError(source)) => {
                        format!("Error generating AI greeting: {}", source)
                    }
                    other => other.to_string(),
                });
            }

            if let Some(index) = replay {
                self.replay_or_report(session, index, &mut errors).await;
            }

            if let Some(utterance) = utterance {
                if let Err(e) = self.submit(session, &utterance).await {
                    error!(session = %session.id(), "Synthesis failed: {}", e);
                    errors.push(e.to_string());
                }
            }

            match self.execute_pending(session).await {
                Some(Ok(rows)) => result = Some(rows),
                Some(Err(e)) => {
                    error!(session = %session.id(), "Query execution failed: {}", e);
                    errors.push(e.to_string());
                }
                None => {}
            }
        }

        RenderOutcome {
            session_id: session.id(),
            state: self.state(session),
            turns: session.turns().to_vec(),
            input_history: session.input_history().to_vec(),
            pending_query: session.pending_query().map(str::to_string),
            has_service_account: session.credentials().service_account().is_some(),
            has_api_key: session.credentials().api_key().is_some(),
            result,
            notices,
            errors,
        }
    }

    async fn replay_or_report(&self, session: &mut Session, index: usize, errors: &mut Vec<String>) {
        if let Err(e) = self.replay(session, index).await {
            error!(session = %session.id(), "Replay failed: {}", e);
            errors.push(e.to_string());
        }
    }

    fn accept(&self, session: &mut Session, raw: String) {
        let sql = sanitize(&raw);
        debug!(session = %session.id(), "Pending query: {}", sql);
        session.push_turn(Turn::assistant(raw));
        session.set_pending_query(sql);
    }
}
