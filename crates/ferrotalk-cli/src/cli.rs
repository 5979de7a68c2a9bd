//! CLI argument definitions for ferrotalk.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ask` | Answer a single question and exit |
//! | `chat` | Interactive conversation on stdin |
//! | `tools` | Print the tool registry as JSON Schema |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--timeout-ms` | `10000` | Deadline for each provider fetch |
//! | `--offline` | `false` | Route with keyword rules instead of a language model |
//! | `--web-search` | `false` | Register the `web_search` tool |
//! | `--json` | `false` | Print full turn replies as JSON |
//! | `--verbose` | `false` | Debug logging on stderr |
//!
//! # Examples
//!
//! ```bash
//! ferrotalk ask "What's the price of AAPL?"
//! ferrotalk --offline ask "What's 15% of 250?"
//! ferrotalk chat --conversation-id desk-1
//! ```

use clap::{Args, Parser, Subcommand};

/// Conversational stock and crypto price queries.
#[derive(Debug, Parser)]
#[command(
    name = "ferrotalk",
    author,
    version,
    about = "Conversational stock and crypto price queries",
    long_about = "ferrotalk answers questions about stock and crypto prices. A language model \
(or built-in keyword rules with --offline) picks one tool per question; prices come from Yahoo \
Finance with Alpha Vantage as a fallback.\n\
\n\
Environment:\n\
  FERROTALK_ALPHAVANTAGE_API_KEY / ALPHA_VANTAGE_API_KEY   Alpha Vantage key\n\
  FERROTALK_LLM_API_KEY / GROQ_API_KEY                      language model key\n\
  FERROTALK_LLM_BASE_URL, FERROTALK_LLM_MODEL               language model endpoint\n\
  RUST_LOG                                                  log filter"
)]
pub struct Cli {
    /// Deadline for each provider fetch, in milliseconds.
    #[arg(long, global = true, default_value_t = 10_000)]
    pub timeout_ms: u64,

    /// Interpret questions with keyword rules; never call the language model.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Offer the web_search tool (DuckDuckGo instant answers).
    #[arg(long, global = true, default_value_t = false)]
    pub web_search: bool,

    /// Print the whole turn reply (trace, tool call, result) as JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Log at debug level on stderr.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Answer one question.
    ///
    ///   ferrotalk ask "What's the price of Tesla?"
    ///   ferrotalk ask How did NVDA change from 2024-03-01 to 2024-03-08
    Ask(AskArgs),

    /// Start an interactive conversation. Type `exit` to leave; Ctrl-C cancels.
    Chat(ChatArgs),

    /// Print the tool registry with JSON Schema arguments.
    Tools,
}

#[derive(Debug, Args)]
pub struct AskArgs {
    /// The question; multiple words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    pub question: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ChatArgs {
    /// Conversation identifier; a random one is generated when omitted.
    #[arg(long)]
    pub conversation_id: Option<String>,
}
