use std::future::Future;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use ferrotalk_agent::{Dispatcher, TurnError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::debug;
use uuid::Uuid;

use crate::cli::ChatArgs;
use crate::error::CliError;

use super::print_reply;

const EXIT_WORDS: [&str; 3] = ["exit", "quit", ":q"];

/// Reads one question per line until EOF, an exit word, or Ctrl-C.
pub async fn run(
    args: &ChatArgs,
    dispatcher: &Arc<Dispatcher>,
    json: bool,
) -> Result<ExitCode, CliError> {
    let conversation_id = args
        .conversation_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let session = dispatcher.open_session(conversation_id);
    debug!(conversation_id = session.conversation_id(), "chat session opened");

    eprintln!("ferrotalk chat ({}). Type 'exit' to leave.", session.conversation_id());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let Some(line) = read_line(&mut lines, tokio::signal::ctrl_c()).await? else {
            break;
        };
        let utterance = line.trim();
        if utterance.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&utterance.to_ascii_lowercase().as_str()) {
            break;
        }

        tokio::select! {
            outcome = session.handle_turn(utterance) => match outcome {
                Ok(reply) => {
                    print_reply(&reply, json)?;
                }
                Err(TurnError::Cancelled { .. }) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                session.close();
                eprintln!("cancelled");
                break;
            }
        }
    }

    session.close();
    Ok(ExitCode::SUCCESS)
}

/// Next input line, or `None` at end of input or once `interrupt` resolves.
async fn read_line<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future,
{
    // `next_line` is cancel safe, so an interrupt while waiting loses no input.
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => {
            eprintln!();
            debug!("interrupted while waiting for input");
            Ok(None)
        }
    }
}

fn prompt() -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "> ")?;
    stdout.flush()?;
    Ok(())
}
