use std::process::ExitCode;

use ferrotalk_agent::Dispatcher;
use uuid::Uuid;

use crate::cli::AskArgs;
use crate::error::CliError;

use super::print_reply;

pub async fn run(
    args: &AskArgs,
    dispatcher: &Dispatcher,
    json: bool,
) -> Result<ExitCode, CliError> {
    let question = args.question.join(" ");
    if question.trim().is_empty() {
        return Err(CliError::Command(String::from("question must not be empty")));
    }

    let conversation_id = Uuid::new_v4().to_string();
    let reply = dispatcher.handle_turn(&conversation_id, question.trim()).await;
    print_reply(&reply, json)
}
