//! Conversation controller
//!
//! Owns the transcript, the pending-input buffer and the request state, and
//! drives one exchange with the completion service at a time:
//!
//! 1. [`Conversation::begin`] records the user message and returns an [`Exchange`]
//! 2. [`Exchange::send`] performs the single outbound request
//! 3. [`Conversation::resolve`] appends the reply (or error text) and goes idle
//!
//! [`Conversation::submit`] runs all three in sequence for callers that can
//! simply await the result.

use std::sync::Arc;

use crate::ai::CompletionService;
use crate::error::{CompletionError, GENERIC_FAILURE_TEXT};
use crate::input::InputBuffer;
use crate::state::{ChatMessage, RequestState, Transcript};

pub struct Conversation {
    transcript: Transcript,
    input: InputBuffer,
    state: RequestState,
    service: Arc<dyn CompletionService>,
}

/// One outstanding request: the payload sent and the service it goes to
pub struct Exchange {
    messages: Vec<ChatMessage>,
    service: Arc<dyn CompletionService>,
}

impl Exchange {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub async fn send(self) -> Result<String, CompletionError> {
        self.service.complete(&self.messages).await
    }
}

impl Conversation {
    pub fn new(service: Arc<dyn CompletionService>, greeting: impl Into<String>) -> Self {
        Self {
            transcript: Transcript::new(greeting),
            input: InputBuffer::new(),
            state: RequestState::Idle,
            service,
        }
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_awaiting(&self) -> bool {
        self.state == RequestState::Awaiting
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputBuffer {
        &mut self.input
    }

    pub fn model(&self) -> &str {
        self.service.model()
    }

    /// Start an exchange for `raw_input`.
    ///
    /// Returns `None` without touching any state when the input is blank or a
    /// request is already outstanding. Otherwise the user message is appended,
    /// the input buffer cleared and the state set to awaiting before returning.
    pub fn begin(&mut self, raw_input: &str) -> Option<Exchange> {
        if raw_input.trim().is_empty() {
            return None;
        }
        if self.is_awaiting() {
            tracing::debug!("submission rejected, a request is already outstanding");
            return None;
        }

        self.transcript.push(ChatMessage::user(raw_input));
        self.input.clear();
        self.state = RequestState::Awaiting;

        tracing::info!(
            model = %self.service.model(),
            messages = self.transcript.len(),
            "submitting conversation"
        );

        Some(Exchange {
            messages: self.transcript.messages().to_vec(),
            service: Arc::clone(&self.service),
        })
    }

    /// Start an exchange with whatever is in the pending-input buffer
    pub fn begin_from_input(&mut self) -> Option<Exchange> {
        if self.input.is_blank() || self.is_awaiting() {
            return None;
        }
        let raw = self.input.take();
        self.begin(&raw)
    }

    /// Finish the outstanding exchange with its outcome
    pub fn resolve(&mut self, outcome: Result<String, CompletionError>) {
        if !self.is_awaiting() {
            tracing::warn!("resolve called with no outstanding request, ignoring");
            return;
        }

        let reply = match outcome {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(error = %err, "exchange failed");
                err.transcript_text()
            }
        };

        self.transcript.push(ChatMessage::assistant(reply));
        self.state = RequestState::Idle;
    }

    /// Finish the outstanding exchange when its task died before producing an outcome
    pub fn abandon(&mut self, reason: &str) {
        if !self.is_awaiting() {
            return;
        }
        tracing::error!(reason, "exchange task ended without a result");
        self.transcript.push(ChatMessage::assistant(GENERIC_FAILURE_TEXT));
        self.state = RequestState::Idle;
    }

    /// Run a whole exchange. Returns false if the input was not accepted.
    pub async fn submit(&mut self, raw_input: &str) -> bool {
        let Some(exchange) = self.begin(raw_input) else {
            return false;
        };
        let outcome = exchange.send().await;
        self.resolve(outcome);
        true
    }
}
