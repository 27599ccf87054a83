use core::fmt;

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// Input from the task side.
    User,
    /// Output of the model.
    Assistant,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author of the turn.
    pub role: Role,
    /// Text of the turn.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Per-call overrides accepted by the model gateway.
///
/// Unset values fall back to the gateway's configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CallOptions {
    /// Sampling temperature override.
    pub temperature: Option<f32>,
    /// Completion budget override.
    pub max_tokens: Option<u32>,
    /// Deliver the response incrementally.
    pub streaming: bool,
}

impl CallOptions {
    /// Options for an incremental call.
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            streaming: true,
            ..Self::default()
        }
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the completion budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Fully resolved request dispatched to the remote endpoint.
///
/// Built fresh for each call and never mutated after dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCallRequest {
    /// Remote model identifier.
    pub model_id: String,
    /// Ordered conversation sent to the model.
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum completion tokens.
    pub max_tokens: u32,
    /// Whether the response is delivered incrementally.
    pub streaming: bool,
}

/// Defaults applied to calls that leave options unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallDefaults {
    /// Default sampling temperature.
    pub temperature: f32,
    /// Default completion budget.
    pub max_tokens: u32,
}

impl Default for CallDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            max_tokens: 2048,
        }
    }
}

impl ModelCallRequest {
    /// Resolves caller options against the defaults.
    pub fn resolve(
        model_id: impl Into<String>,
        messages: Vec<ChatMessage>,
        options: CallOptions,
        defaults: CallDefaults,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            messages,
            temperature: options.temperature.unwrap_or(defaults.temperature),
            max_tokens: options.max_tokens.unwrap_or(defaults.max_tokens),
            streaming: options.streaming,
        }
    }
}
