//! # ferrotalk-agent
//!
//! Conversational layer of ferrotalk: tool descriptors, intent interpreters and the per-turn
//! dispatcher that ties them to the market data core.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`tool`] | Tool names, calls and results |
//! | [`registry`] | Versioned tool descriptors, JSON Schema rendering and argument validation |
//! | [`interpreter`] | Keyword and chat-completions interpreters |
//! | [`tools`] | Tool bodies over the retrieval coordinator and computations |
//! | [`search`] | DuckDuckGo backend for `web_search` |
//! | [`format`] | Reply text for successes and failures |
//! | [`dispatcher`] | Turn state machine, per-conversation serialization and sessions |
//! | [`error`] | Interpreter, search and turn errors |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferrotalk_agent::{Dispatcher, KeywordInterpreter, ToolExecutor};
//!
//! let executor = ToolExecutor::new(coordinator);
//! let dispatcher = Dispatcher::new(Arc::new(KeywordInterpreter::new()), executor);
//!
//! let reply = dispatcher.handle_turn("conversation-1", "What's 15% of 250?").await;
//! assert!(reply.text.contains("37.5"));
//! ```

pub mod dispatcher;
pub mod error;
pub mod format;
pub mod interpreter;
pub mod registry;
pub mod search;
pub mod tool;
pub mod tools;

pub use dispatcher::{Dispatcher, Session, SessionCloser, TurnReply, TurnState};
pub use error::{InterpreterError, SearchError, TurnError};
pub use interpreter::{
    ChatCompletionsInterpreter, IntentInterpreter, InterpretFuture, Interpretation,
    KeywordInterpreter,
};
pub use registry::{
    ArgumentError, ArgumentKind, ArgumentSpec, CallRejection, ToolDescriptor, ToolRegistry,
    ValidatedArguments, ValidatedCall, REGISTRY_VERSION,
};
pub use search::DuckDuckGoSearch;
pub use tool::{FailureKind, ToolCall, ToolName, ToolOutput, ToolResult};
pub use tools::{SearchFuture, ToolExecutor, WebSearch};
