//! Session input.

use tokio_util::sync::CancellationToken;

use crate::types::message::Message;
use crate::types::ProviderId;

/// What the model is asked: a single prompt or a full history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Text(String),
    Messages(Vec<Message>),
}

impl Prompt {
    /// The conversation as a list of turns.
    pub fn to_messages(&self) -> Vec<Message> {
        match self {
            Prompt::Text(t) => vec![Message::user(t.clone())],
            Prompt::Messages(m) => m.clone(),
        }
    }
}

/// Input to one session. Built once by the caller and handed over whole.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub provider_id: ProviderId,
    pub model: Option<String>,
    pub prompt: Prompt,
    pub system: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub cancel: Option<CancellationToken>,
    /// Correlation id sent to the vendor as `x-request-id`.
    pub session_id: Option<String>,
}

impl SessionRequest {
    pub fn new(provider_id: ProviderId, prompt: impl Into<String>) -> Self {
        Self {
            provider_id,
            model: None,
            prompt: Prompt::Text(prompt.into()),
            system: None,
            temperature: None,
            max_output_tokens: None,
            cancel: None,
            session_id: None,
        }
    }

    pub fn with_messages(provider_id: ProviderId, messages: Vec<Message>) -> Self {
        Self {
            prompt: Prompt::Messages(messages),
            ..Self::new(provider_id, String::new())
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Token for this session: a child of the caller's token when one was
    /// given, so releasing the session never cancels the caller.
    pub fn session_token(&self) -> CancellationToken {
        match &self.cancel {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        }
    }

    pub(crate) fn requested_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}
