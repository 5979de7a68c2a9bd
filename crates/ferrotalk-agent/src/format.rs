//! Rendering of tool results into reply text.

use crate::tool::{FailureKind, ToolResult};

/// Renders a number with at most `decimals` places and no trailing zeros.
pub fn number(value: f64, decimals: usize) -> String {
    let rendered = format!("{value:.decimals$}");
    let trimmed = if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.')
    } else {
        rendered.as_str()
    };
    match trimmed {
        "-0" => String::from("0"),
        other => other.to_owned(),
    }
}

/// Prices keep two decimals, or more below one unit.
pub fn price(value: f64) -> String {
    if value.abs() >= 1.0 {
        format!("{value:.2}")
    } else {
        number(value, 6)
    }
}

pub fn percent(value: f64) -> String {
    format!("{value:+.2}%")
}

/// User-facing text for a tool result.
pub fn render(result: &ToolResult) -> String {
    match result {
        ToolResult::Success { value } => {
            let mut text = value.summary.clone();
            for disclosure in &value.disclosures {
                text.push_str("\nNote: ");
                text.push_str(disclosure);
            }
            text
        }
        ToolResult::Failure { kind, message } => failure(*kind, message),
    }
}

pub fn failure(kind: FailureKind, message: &str) -> String {
    match kind {
        FailureKind::SymbolNotFound => format!(
            "I couldn't find any market data for that symbol ({message}). Please check the ticker and try again."
        ),
        FailureKind::ProviderUnavailable => String::from(
            "The market data providers are unavailable right now. Please try again in a few minutes.",
        ),
        FailureKind::InsufficientData => {
            format!("There isn't enough price history to answer that: {message}.")
        }
        FailureKind::EmptySeries => {
            format!("No price data was returned for that period ({message}).")
        }
        FailureKind::DivisionByZero => {
            String::from("That calculation would divide by zero, so there is no answer.")
        }
        FailureKind::InvalidArguments => {
            format!("I couldn't run that request because an argument was invalid: {message}.")
        }
        FailureKind::UnknownTool => {
            format!("I don't have a tool for that ({message}).")
        }
        FailureKind::InterpreterUnavailable => String::from(
            "I couldn't understand the request because the language service is unavailable. Please try again later.",
        ),
        FailureKind::SearchUnavailable => {
            String::from("Web search is unavailable right now. Please try again later.")
        }
    }
}
