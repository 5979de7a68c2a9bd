mod ask;
mod chat;
mod tools;

use std::process::ExitCode;
use std::sync::Arc;

use ferrotalk_agent::{
    ChatCompletionsInterpreter, Dispatcher, DuckDuckGoSearch, IntentInterpreter,
    KeywordInterpreter, ToolExecutor, TurnReply,
};
use ferrotalk_core::{
    AlphaVantageAdapter, HttpClient, ProviderPolicy, ReqwestHttpClient, RetrievalCoordinator,
    YahooAdapter,
};
use tracing::info;

use crate::cli::{Cli, Command};
use crate::config::AppConfig;
use crate::error::CliError;

pub async fn run(cli: &Cli, config: &AppConfig) -> Result<ExitCode, CliError> {
    match &cli.command {
        Command::Tools => tools::run(config),
        Command::Ask(args) => {
            let dispatcher = build_dispatcher(config);
            ask::run(args, &dispatcher, cli.json).await
        }
        Command::Chat(args) => {
            let dispatcher = Arc::new(build_dispatcher(config));
            chat::run(args, &dispatcher, cli.json).await
        }
    }
}

/// Yahoo Finance primary, Alpha Vantage secondary, interpreter chosen by configuration.
pub fn build_dispatcher(config: &AppConfig) -> Dispatcher {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());

    let fetch_timeout = config.fetch_timeout;
    let yahoo = YahooAdapter::new(Arc::clone(&http))
        .with_policy(ProviderPolicy::yahoo_default().with_request_timeout(fetch_timeout));
    let alphavantage_key = config.alphavantage_api_key.clone();
    let alphavantage = AlphaVantageAdapter::new(Arc::clone(&http), alphavantage_key)
        .with_policy(ProviderPolicy::alphavantage_default().with_request_timeout(fetch_timeout));
    let coordinator = RetrievalCoordinator::new(Arc::new(yahoo), Arc::new(alphavantage))
        .with_fetch_timeout(fetch_timeout);

    let mut executor = ToolExecutor::new(coordinator);
    if config.web_search {
        executor = executor.with_web_search(Arc::new(DuckDuckGoSearch::new(Arc::clone(&http))));
    }

    let interpreter: Arc<dyn IntentInterpreter> = match config.language_model_key() {
        Some(key) => Arc::new(
            ChatCompletionsInterpreter::new(Arc::clone(&http), config.llm_base_url.clone(), key)
                .with_model(config.llm_model.clone()),
        ),
        None => Arc::new(KeywordInterpreter::new()),
    };

    let dispatcher = Dispatcher::new(interpreter, executor);
    info!(
        interpreter = dispatcher.interpreter_name(),
        tools = dispatcher.registry().descriptors().len(),
        "dispatcher ready"
    );
    dispatcher
}

/// Prints a reply; failures map to exit code 3.
fn print_reply(reply: &TurnReply, json: bool) -> Result<ExitCode, CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(reply)?);
    } else {
        println!("{}", reply.text);
    }

    let failed = reply
        .result
        .as_ref()
        .is_some_and(|result| !result.is_success());
    Ok(if failed { ExitCode::from(3) } else { ExitCode::SUCCESS })
}
