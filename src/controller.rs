//! Conversation state and the chat-then-sequence orchestration.
//!
//! The controller is the only owner of the transcript and the current
//! sequence. Sending a message is split in two so a UI never waits on the
//! network: [`Controller::begin_exchange`] records the user message and hands
//! back an [`ExchangeRequest`] to run elsewhere, and [`Controller::apply`]
//! folds each [`ExchangeEvent`] back into the state.

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{run_exchange, Backend, ExchangeEvent, ExchangeRequest};
use crate::model::{conversation, normalize_steps, Message, Sequence, SequenceStep};
use crate::provider::Provider;
use crate::session::UserId;

pub const CHAT_ERROR_NOTICE: &str = "An error occurred. Please try again.";
pub const SEQUENCE_ERROR_NOTICE: &str = "Error generating sequence. Please try again.";

/// Why a message was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendRejected {
    #[error("message is empty")]
    Empty,
    #[error("a response is still being generated")]
    Busy,
}

pub struct Controller {
    messages: Vec<Message>,
    sequence: Option<Sequence>,
    is_generating: bool,
    /// The in-flight exchange already has its chat reply
    reply_received: bool,
    selected_provider: Provider,
    model_name: Option<String>,
    user_id: UserId,
}

impl Controller {
    pub fn new(user_id: UserId, provider: Provider) -> Self {
        Self {
            messages: Vec::new(),
            sequence: None,
            is_generating: false,
            reply_received: false,
            selected_provider: provider,
            model_name: None,
            user_id,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn sequence(&self) -> Option<&Sequence> {
        self.sequence.as_ref()
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn provider(&self) -> Provider {
        self.selected_provider
    }

    pub fn set_provider(&mut self, provider: Provider) {
        self.selected_provider = provider;
    }

    pub fn cycle_provider(&mut self) -> Provider {
        self.selected_provider = self.selected_provider.next();
        self.selected_provider
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model_name.as_deref()
    }

    pub fn set_model_name(&mut self, model_name: Option<String>) {
        self.model_name = model_name.filter(|m| !m.trim().is_empty());
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Record the user's message and start an exchange.
    ///
    /// The message is appended immediately and is never retracted, whatever
    /// happens to the backend calls. While an exchange is in flight further
    /// sends are rejected and leave the transcript untouched.
    pub fn begin_exchange(&mut self, content: &str) -> Result<ExchangeRequest, SendRejected> {
        if content.trim().is_empty() {
            return Err(SendRejected::Empty);
        }
        if self.is_generating {
            debug!("send rejected while generating");
            return Err(SendRejected::Busy);
        }

        self.messages.push(Message::user(content));
        self.is_generating = true;
        self.reply_received = false;

        Ok(ExchangeRequest {
            content: content.to_string(),
            user_id: self.user_id.clone(),
            provider: self.selected_provider,
            model_name: self.model_name.clone(),
            transcript: conversation(&self.messages),
        })
    }

    /// Fold one exchange event into the state
    pub fn apply(&mut self, event: ExchangeEvent) {
        let terminal = event.is_terminal();

        match event {
            ExchangeEvent::ChatReplied(reply) => {
                self.messages.push(Message::assistant(reply.message));
                self.reply_received = true;
            }
            ExchangeEvent::ChatFailed(err) => {
                info!(error = %err, "chat failed");
                self.messages.push(Message::status(CHAT_ERROR_NOTICE));
            }
            ExchangeEvent::SequenceGenerated { response, context } => {
                let mut sequence = Sequence::new(normalize_steps(response.sequence));
                sequence.id = response.sequence_id;
                sequence.context = Some(context);
                info!(steps = sequence.steps.len(), "sequence replaced");
                self.sequence = Some(sequence);
            }
            ExchangeEvent::SequenceFailed(err) => {
                info!(error = %err, "sequence generation failed; keeping previous sequence");
                self.messages.push(Message::status(SEQUENCE_ERROR_NOTICE));
            }
            ExchangeEvent::Aborted(reason) => {
                info!(%reason, "exchange aborted");
                if self.is_generating {
                    let notice = if self.reply_received {
                        SEQUENCE_ERROR_NOTICE
                    } else {
                        CHAT_ERROR_NOTICE
                    };
                    self.messages.push(Message::status(notice));
                }
            }
        }

        if terminal {
            self.is_generating = false;
        }
    }

    /// Send a message and wait for the whole exchange to finish
    pub async fn send_message<B>(&mut self, backend: &B, content: &str) -> Result<(), SendRejected>
    where
        B: Backend + ?Sized,
    {
        let request = self.begin_exchange(content)?;
        run_exchange(backend, request, |event| self.apply(event)).await;
        // run_exchange always ends on a terminal event; this is a backstop
        if self.is_generating {
            self.apply(ExchangeEvent::Aborted("exchange ended early".to_string()));
        }
        Ok(())
    }

    /// Replace the current sequence's steps verbatim.
    ///
    /// No validation or renumbering happens here. Returns `false` (and
    /// changes nothing) when there is no sequence yet.
    pub fn update_sequence(&mut self, updated_steps: Vec<SequenceStep>) -> bool {
        match self.sequence.as_mut() {
            Some(sequence) => {
                sequence.steps = updated_steps;
                sequence.updated_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Change the content of step `index`, leaving every other field alone
    pub fn edit_step(&mut self, index: usize, content: &str) -> bool {
        let Some(sequence) = self.sequence.as_ref() else {
            return false;
        };
        if index >= sequence.steps.len() {
            return false;
        }

        let mut steps = sequence.steps.clone();
        steps[index].content = content.to_string();
        self.update_sequence(steps)
    }
}
