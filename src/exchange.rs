use futures::StreamExt;
use log::{ debug, info, warn };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;

use crate::history::ConversationStore;
use crate::models::chat::{ Conversation, Role, Turn };
use crate::models::generation::GenerationResult;
use crate::service::AiService;
use crate::validation::validate_message;

pub const FALLBACK_ERROR_MESSAGE: &str =
    "Sorry, an error occurred while processing your request. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    Validating,
    Sending,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Validation failed; the conversation was not touched.
    Rejected(String),
    /// The recorded assistant turn holds generated text.
    Answered(Turn),
    /// The recorded assistant turn holds an error message.
    Failed(Turn),
}

/// What a front end renders.
#[derive(Debug, Clone, Copy)]
pub struct ChatView<'a> {
    pub conversation: &'a Conversation,
    pub busy: bool,
    pub transient_error: Option<&'a str>,
}

/// Clears the busy flag when dropped, whichever way `submit` exits.
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    fn engage(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag: flag.clone() }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Drives one exchange: validate, record the user turn, call the service,
/// record the assistant turn. Remote failures become ordinary assistant
/// turns; only validation failures use the transient error.
pub struct ExchangeController {
    store: ConversationStore,
    service: Arc<AiService>,
    state: ExchangeState,
    busy: Arc<AtomicBool>,
    transient_error: Option<String>,
}

impl ExchangeController {
    pub fn new(store: ConversationStore, service: Arc<AiService>) -> Self {
        Self {
            store,
            service,
            state: ExchangeState::Idle,
            busy: Arc::new(AtomicBool::new(false)),
            transient_error: None,
        }
    }

    /// Hydrates the conversation from durable storage.
    pub async fn load(&mut self) -> &Conversation {
        self.store.load().await
    }

    pub fn view(&self) -> ChatView<'_> {
        ChatView {
            conversation: self.store.conversation(),
            busy: self.is_busy(),
            transient_error: self.transient_error.as_deref(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        self.store.conversation()
    }

    pub fn state(&self) -> ExchangeState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Shared handle to the busy flag so another task can gate resubmission.
    /// The flag is cooperative; nothing here rejects overlapping calls.
    pub fn busy_flag(&self) -> Arc<AtomicBool> {
        self.busy.clone()
    }

    pub fn transient_error(&self) -> Option<&str> {
        self.transient_error.as_deref()
    }

    pub fn service(&self) -> &Arc<AiService> {
        &self.service
    }

    pub async fn submit(&mut self, message: &str) -> SubmitOutcome {
        if let Err(outcome) = self.begin(message).await {
            return outcome;
        }

        let _busy = BusyGuard::engage(&self.busy);
        self.state = ExchangeState::Sending;

        // The untrimmed text goes to the remote endpoint.
        let result = self.service.generate(message).await;
        self.finish(result).await
    }

    /// Same cycle over the streaming form. `on_chunk` sees every incremental
    /// chunk; the conversation gets one assistant turn with the full text.
    pub async fn submit_streaming<F>(&mut self, message: &str, mut on_chunk: F) -> SubmitOutcome
        where F: FnMut(&str)
    {
        if let Err(outcome) = self.begin(message).await {
            return outcome;
        }

        let _busy = BusyGuard::engage(&self.busy);
        self.state = ExchangeState::Sending;

        let mut stream = self.service.generate_streaming(message).await;
        let mut outcome = GenerationResult::failure(FALLBACK_ERROR_MESSAGE);
        while let Some(result) = stream.next().await {
            if result.is_final() {
                outcome = result;
                break;
            }
            if let Some(chunk) = result.content.as_deref() {
                on_chunk(chunk);
            }
        }
        self.finish(outcome).await
    }

    async fn begin(&mut self, message: &str) -> Result<(), SubmitOutcome> {
        self.state = ExchangeState::Validating;
        let validation = validate_message(message);
        if !validation.valid {
            let error = validation.error.unwrap_or_else(|| "Invalid message".to_string());
            debug!("Rejected submission: {}", error);
            self.transient_error = Some(error.clone());
            self.state = ExchangeState::Idle;
            return Err(SubmitOutcome::Rejected(error));
        }

        self.transient_error = None;
        self.store.append(Role::User, message).await;
        Ok(())
    }

    async fn finish(&mut self, result: GenerationResult) -> SubmitOutcome {
        let outcome = match result {
            GenerationResult { success: true, content: Some(content), .. } if !content.is_empty() => {
                let turn = Turn::assistant(content);
                self.store.append_turn(turn.clone()).await;
                SubmitOutcome::Answered(turn)
            }
            GenerationResult { error, .. } => {
                let message = error.unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
                warn!("Generation failed: {}", message);
                let turn = Turn::assistant(message);
                self.store.append_turn(turn.clone()).await;
                SubmitOutcome::Failed(turn)
            }
        };
        self.state = ExchangeState::Idle;
        outcome
    }

    pub async fn clear(&mut self) {
        self.store.clear().await;
        self.transient_error = None;
        info!("Conversation cleared");
    }

    pub async fn reinitialize(&self) {
        self.service.reinitialize().await;
    }
}
