use thiserror::Error;

/// Failure to turn an utterance into an interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpreterError {
    #[error("interpreter request failed: {0}")]
    Transport(String),

    #[error("interpreter returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("interpreter response could not be parsed: {0}")]
    MalformedResponse(String),
}

impl InterpreterError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "interpreter.transport",
            Self::Status { .. } => "interpreter.status",
            Self::MalformedResponse(_) => "interpreter.malformed_response",
        }
    }
}

/// Failure of the optional web search backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("web search failed: {message}")]
pub struct SearchError {
    pub message: String,
}

impl SearchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Turn-level errors surfaced by a [`crate::Session`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("session {conversation_id} was closed")]
    Cancelled { conversation_id: String },
}
