//! # Intent Dispatcher
//!
//! Drives one conversational turn through a fixed state machine:
//!
//! ```text
//! AwaitingIntent ──PlainAnswer──────────────────────────────▶ Done
//!       │
//!       └─ToolCall─▶ ExecutingTool ─▶ FormattingResult ─────▶ Done
//! ```
//!
//! Turns of the same conversation are serialized by a per-conversation async gate held for the
//! whole turn. Different conversations run concurrently. A gate lives only while a turn of its
//! conversation is running or queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::TurnError;
use crate::format;
use crate::interpreter::{IntentInterpreter, Interpretation};
use crate::registry::{CallRejection, ToolRegistry};
use crate::tool::{FailureKind, ToolCall, ToolResult};
use crate::tools::ToolExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingIntent,
    ExecutingTool,
    FormattingResult,
    Done,
}

/// Everything produced by one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub conversation_id: String,
    pub text: String,
    /// States visited, in order.
    pub trace: Vec<TurnState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

pub struct Dispatcher {
    interpreter: Arc<dyn IntentInterpreter>,
    registry: ToolRegistry,
    executor: ToolExecutor,
    gates: Mutex<HashMap<String, Gate>>,
}

impl Dispatcher {
    /// Registry is the standard set, plus `web_search` when the executor has a backend.
    pub fn new(interpreter: Arc<dyn IntentInterpreter>, executor: ToolExecutor) -> Self {
        let registry = if executor.has_web_search() {
            ToolRegistry::standard().with_web_search()
        } else {
            ToolRegistry::standard()
        };
        Self {
            interpreter,
            registry,
            executor,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn interpreter_name(&self) -> &'static str {
        self.interpreter.name()
    }

    pub async fn handle_turn(&self, conversation_id: &str, utterance: &str) -> TurnReply {
        // Declared first so it drops last, after the gate and its guard.
        let _lease = GateLease {
            dispatcher: self,
            conversation_id,
        };
        let gate = self.gate(conversation_id);
        let _turn = gate.lock().await;

        let started = Instant::now();
        let reply = self.run_turn(conversation_id, utterance).await;

        let tool = reply
            .tool_call
            .as_ref()
            .map_or("none", |call| call.tool_name.as_str());
        let failure = reply
            .result
            .as_ref()
            .and_then(ToolResult::failure_kind)
            .map_or("none", FailureKind::as_str);
        info!(
            conversation_id,
            interpreter = self.interpreter.name(),
            tool,
            failure,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "turn completed"
        );
        reply
    }

    /// Conversations with a turn running or queued.
    pub fn open_gates(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Opens a cancellable session bound to one conversation.
    pub fn open_session(self: &Arc<Self>, conversation_id: impl Into<String>) -> Session {
        let (sender, _) = watch::channel(false);
        Session {
            dispatcher: Arc::clone(self),
            conversation_id: conversation_id.into(),
            closed: Arc::new(sender),
        }
    }

    async fn run_turn(&self, conversation_id: &str, utterance: &str) -> TurnReply {
        let mut trace = vec![TurnState::AwaitingIntent];
        let reply = |trace: Vec<TurnState>, text: String, tool_call, result| TurnReply {
            conversation_id: conversation_id.to_owned(),
            text,
            trace,
            tool_call,
            result,
        };

        let interpretation = match self
            .interpreter
            .interpret(utterance, self.registry.descriptors())
            .await
        {
            Ok(interpretation) => interpretation,
            Err(error) => {
                warn!(conversation_id, code = error.code(), error = %error, "interpreter failed");
                let result =
                    ToolResult::failure(FailureKind::InterpreterUnavailable, error.to_string());
                trace.push(TurnState::FormattingResult);
                let text = format::render(&result);
                trace.push(TurnState::Done);
                return reply(trace, text, None, Some(result));
            }
        };

        let call = match interpretation {
            Interpretation::PlainAnswer(text) => {
                trace.push(TurnState::Done);
                return reply(trace, text, None, None);
            }
            Interpretation::ToolCall(call) => call,
        };

        trace.push(TurnState::ExecutingTool);
        let result = match self.registry.validate(&call) {
            Ok(validated) => self.executor.execute(&validated).await,
            Err(CallRejection::UnknownTool(name)) => {
                warn!(conversation_id, tool = %name, "interpreter chose an unknown tool");
                ToolResult::failure(FailureKind::UnknownTool, name)
            }
            Err(CallRejection::InvalidArguments(error)) => {
                warn!(
                    conversation_id,
                    tool = %call.tool_name,
                    path = %error.path,
                    "tool arguments rejected"
                );
                ToolResult::failure(FailureKind::InvalidArguments, error.to_string())
            }
        };

        trace.push(TurnState::FormattingResult);
        let text = format::render(&result);
        trace.push(TurnState::Done);
        reply(trace, text, Some(call), Some(result))
    }

    fn gate(&self, conversation_id: &str) -> Gate {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(conversation_id.to_owned()).or_default())
    }

    /// Drops the gate of a conversation with no turn in flight.
    fn release(&self, conversation_id: &str) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if gates
            .get(conversation_id)
            .is_some_and(|gate| Arc::strong_count(gate) == 1)
        {
            gates.remove(conversation_id);
        }
    }
}

/// Releases a conversation's gate when a turn ends, including a turn whose future is dropped.
struct GateLease<'a> {
    dispatcher: &'a Dispatcher,
    conversation_id: &'a str,
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        self.dispatcher.release(self.conversation_id);
    }
}

/// A conversation whose in-flight turns can be cancelled.
///
/// Closing drops the running turn future, abandoning any outstanding provider request, and
/// makes every later turn fail with [`TurnError::Cancelled`].
pub struct Session {
    dispatcher: Arc<Dispatcher>,
    conversation_id: String,
    closed: Arc<watch::Sender<bool>>,
}

impl Session {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub async fn handle_turn(&self, utterance: &str) -> Result<TurnReply, TurnError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(self.cancelled_error());
        }

        tokio::select! {
            reply = self.dispatcher.handle_turn(&self.conversation_id, utterance) => Ok(reply),
            () = cancelled(&mut closed) => {
                info!(conversation_id = %self.conversation_id, "turn cancelled");
                Err(self.cancelled_error())
            }
        }
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Handle that closes the session when dropped or when [`SessionCloser::close`] is called.
    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            closed: Arc::clone(&self.closed),
        }
    }

    fn cancelled_error(&self) -> TurnError {
        TurnError::Cancelled {
            conversation_id: self.conversation_id.clone(),
        }
    }
}

pub struct SessionCloser {
    closed: Arc<watch::Sender<bool>>,
}

impl SessionCloser {
    pub fn close(self) {}
}

impl Drop for SessionCloser {
    fn drop(&mut self) {
        self.closed.send_replace(true);
    }
}

async fn cancelled(closed: &mut watch::Receiver<bool>) {
    loop {
        if *closed.borrow_and_update() {
            return;
        }
        if closed.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
