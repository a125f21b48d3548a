//! A chat session: the transcript plus the backend that feeds it.

use sc_backend::ChatBackend;
use sc_protocol::{ChatRequest, Transcript};
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::turn::{drive_turn, TranscriptObserver, TurnOutcome};

/// Generate a fresh conversation thread id.
pub fn new_thread_id() -> String {
    Uuid::new_v4().to_string()
}

/// Owns the transcript for the lifetime of the conversation.
///
/// `send` borrows the session mutably for the whole turn, so a second turn
/// cannot start until the first one has finished.
pub struct ChatSession<B> {
    backend: B,
    transcript: Transcript,
    thread_id: String,
    fresh_thread_per_turn: bool,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(backend: B, config: &SessionConfig) -> Self {
        Self {
            backend,
            transcript: Transcript::new(),
            thread_id: new_thread_id(),
            fresh_thread_per_turn: config.fresh_thread_per_turn,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Thread id of the current (or most recent) turn.
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Send one user message and stream the reply into the transcript.
    ///
    /// Returns `None` without contacting the backend when the message is blank.
    pub async fn send<O>(&mut self, message: &str, observer: &mut O) -> Option<TurnOutcome>
    where
        O: TranscriptObserver + ?Sized,
    {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }

        if self.fresh_thread_per_turn {
            self.thread_id = new_thread_id();
        }
        debug!(thread_id = %self.thread_id, "starting turn");

        self.transcript.push_user(message);
        observer.transcript_changed(&self.transcript);

        let request = ChatRequest::new(message, self.thread_id.clone());
        let events = self.backend.open_turn(&request);
        let outcome = drive_turn(&mut self.transcript, events, observer).await;

        debug!(
            thread_id = %self.thread_id,
            applied = outcome.applied,
            ignored = outcome.ignored,
            failed = outcome.failure.is_some(),
            "turn finished"
        );
        Some(outcome)
    }
}
