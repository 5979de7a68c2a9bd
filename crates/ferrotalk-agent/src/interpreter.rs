//! # Intent interpreters
//!
//! An [`IntentInterpreter`] turns one utterance into exactly one [`ToolCall`] or a plain
//! answer. Two implementations ship:
//!
//! - [`KeywordInterpreter`]: deterministic pattern rules, no network. Used offline and when
//!   no language model key is configured.
//! - [`ChatCompletionsInterpreter`]: an OpenAI-compatible `/chat/completions` endpoint with
//!   function tools (Groq by default).

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};

use ferrotalk_core::{HttpClient, HttpRequest};
use regex::Regex;
use serde_json::{json, Map, Value};
use time::Date;
use tracing::debug;

use crate::error::InterpreterError;
use crate::registry::ToolDescriptor;
use crate::tool::{ToolCall, ToolName};

pub type InterpretFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Interpretation, InterpreterError>> + Send + 'a>>;

/// Outcome of interpreting one utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    ToolCall(ToolCall),
    PlainAnswer(String),
}

pub trait IntentInterpreter: Send + Sync {
    fn name(&self) -> &'static str;

    fn interpret<'a>(
        &'a self,
        utterance: &'a str,
        descriptors: &'a [ToolDescriptor],
    ) -> InterpretFuture<'a>;
}

const HELP_TEXT: &str = "I can look up stock and crypto prices, a stock's key stats, recent price \
                         history, averages over a number of days and the percentage change \
                         between two dates. I can also do quick calculations. Try \"What's the \
                         price of AAPL?\" or \"What's 15% of 250?\".";

const NUMBER: &str = r"-?\d+(?:,\d{3})*(?:\.\d+)?";

const MAX_SPAN_DAYS: i64 = 365;

static PERCENT_OF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)({NUMBER})\s*(?:%|percent)\s+of\s+\$?({NUMBER})"))
        .expect("percent-of pattern compiles")
});

static PERCENT_RATIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\$?({NUMBER})\s+is\s+what\s+(?:percent|percentage|%)\s+of\s+\$?({NUMBER})"
    ))
    .expect("percent-ratio pattern compiles")
});

static SQRT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(?:square\s+root\s+of|sqrt)\s*\(?\s*({NUMBER})"))
        .expect("sqrt pattern compiles")
});

static BINARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)({NUMBER})\s*(\+|-|\*|/|×|÷|\^|\bx\b|plus|minus|times|multiplied\s+by|divided\s+by|to\s+the\s+power\s+of)\s*({NUMBER})"
    ))
    .expect("binary arithmetic pattern compiles")
});

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").expect("date pattern compiles"));

static AVERAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:average|avg|mean)\b").expect("average pattern compiles")
});

static SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)?\s*-?\s*(days?|weeks?|months?|years?)\b")
        .expect("span pattern compiles")
});

static YEAR_TO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:ytd|year\s+to\s+date)\b").expect("ytd pattern compiles")
});

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:price|prices|quote|trading|worth|cost|costs|value|how\s+much)\b")
        .expect("price pattern compiles")
});

static CRYPTO_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:crypto|cryptocurrency|coin|bitcoin|ethereum)\b")
        .expect("crypto pattern compiles")
});

static HISTORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:history|historical|performance|trend|change|changed|yesterday|last|past|over)\b",
    )
    .expect("history pattern compiles")
});

static INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:info|information|overview|stats|statistics|52[\s-]?weeks?|tell\s+me\s+about)\b",
    )
    .expect("info pattern compiles")
});

static SEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:news|search|headlines|look\s+up|find)\b")
        .expect("search pattern compiles")
});

static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(open|opening|high|low|volume)\b").expect("field pattern compiles")
});

static CASHTAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$([A-Za-z]{1,5}(?:\.[A-Za-z])?)\b").expect("cashtag pattern compiles")
});

static TICKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{2,5}(?:\.[A-Z])?)\b").expect("ticker pattern compiles")
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z]+").expect("word pattern compiles"));

const COMPANY_TICKERS: &[(&str, &str)] = &[
    ("APPLE", "AAPL"),
    ("TESLA", "TSLA"),
    ("MICROSOFT", "MSFT"),
    ("GOOGLE", "GOOGL"),
    ("ALPHABET", "GOOGL"),
    ("AMAZON", "AMZN"),
    ("META", "META"),
    ("FACEBOOK", "META"),
    ("NETFLIX", "NFLX"),
    ("NVIDIA", "NVDA"),
    ("BITCOIN", "BTC"),
    ("ETHEREUM", "ETH"),
];

const CRYPTO_BASES: &[&str] = &["BTC", "ETH", "SOL", "DOGE", "XRP", "ADA", "LTC"];

const STOPWORDS: &[&str] = &[
    "THE", "AND", "FOR", "ARE", "BUT", "NOT", "YOU", "ALL", "CAN", "HAD", "HER", "WAS", "ONE",
    "OUR", "OUT", "DAY", "GET", "HAS", "HIM", "HIS", "HOW", "ITS", "MAY", "NEW", "NOW", "OLD",
    "SEE", "TWO", "WAY", "WHO", "BOY", "DID", "MAN", "MEN", "PUT", "SAY", "SHE", "TOO", "USE",
    "USD", "USDT", "EUR", "YTD", "ETF", "WHAT", "IS", "OF", "IN", "ON", "TO", "ME", "MY", "AT",
    "OK", "AM", "PM",
];

/// Deterministic rule-based interpreter.
///
/// Rules are tried in order and the first match wins:
///
/// 1. arithmetic (`15% of 250`, `50 is what percent of 200`, `sqrt 16`, `3 * 4`)
/// 2. average over a span (`average price of TSLA over 30 days`)
/// 3. percentage change between two ISO dates
/// 4. a stock's close on one ISO date
/// 5. key stats (`tell me about AAPL`, `MSFT 52-week range`)
/// 6. price and crypto price
/// 7. price history (`how has MSFT done over the last 3 months`)
/// 8. web search, when offered
/// 9. a bare symbol falls back to a price lookup
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordInterpreter;

impl KeywordInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, utterance: &str, descriptors: &[ToolDescriptor]) -> Interpretation {
        let offered =
            |name: ToolName| descriptors.iter().any(|descriptor| descriptor.name == name);
        let symbol = extract_symbol(utterance);
        let dates: Vec<&str> = ISO_DATE
            .captures_iter(utterance)
            .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
            .collect();

        if offered(ToolName::Arithmetic) {
            if let Some(call) = arithmetic_call(utterance, symbol.is_some() || !dates.is_empty()) {
                return Interpretation::ToolCall(call);
            }
        }

        let Some(symbol) = symbol else {
            if offered(ToolName::WebSearch) && SEARCH.is_match(utterance) {
                return tool_call(ToolName::WebSearch, json!({"query": utterance.trim()}));
            }
            return Interpretation::PlainAnswer(String::from(HELP_TEXT));
        };

        if offered(ToolName::CalculateAveragePrice) && AVERAGE.is_match(utterance) {
            let mut arguments = Map::new();
            arguments.insert(String::from("symbol"), Value::from(symbol.ticker.clone()));
            if let Some(days) = span_days(utterance) {
                arguments.insert(String::from("days"), Value::from(days));
            }
            if let Some(field) = FIELD
                .captures(utterance)
                .and_then(|captures| captures.get(1))
                .map(|m| normalize_field(m.as_str()))
            {
                arguments.insert(String::from("field"), Value::from(field));
            }
            return tool_call(ToolName::CalculateAveragePrice, Value::Object(arguments));
        }

        if offered(ToolName::PercentageChange) {
            if let [from, to, ..] = dates.as_slice() {
                let (from, to) = if from <= to { (from, to) } else { (to, from) };
                return tool_call(
                    ToolName::PercentageChange,
                    json!({"symbol": symbol.ticker, "from_date": from, "to_date": to}),
                );
            }
        }

        let crypto = symbol.crypto || CRYPTO_WORD.is_match(utterance);
        if let [date] = dates.as_slice() {
            if !crypto && offered(ToolName::GetStockPrice) {
                return tool_call(
                    ToolName::GetStockPrice,
                    json!({"symbol": symbol.ticker, "date": date}),
                );
            }
        }

        if !crypto && offered(ToolName::GetStockInfo) && INFO.is_match(utterance) {
            return tool_call(ToolName::GetStockInfo, json!({"symbol": symbol.ticker}));
        }

        if PRICE.is_match(utterance) {
            return price_call(&symbol.ticker, crypto, &offered);
        }

        if offered(ToolName::GetHistoricalData)
            && (HISTORY.is_match(utterance) || YEAR_TO_DATE.is_match(utterance))
        {
            return tool_call(
                ToolName::GetHistoricalData,
                json!({"symbol": symbol.ticker, "period": history_period(utterance)}),
            );
        }

        if offered(ToolName::WebSearch) && SEARCH.is_match(utterance) {
            return tool_call(ToolName::WebSearch, json!({"query": utterance.trim()}));
        }

        price_call(&symbol.ticker, crypto, &offered)
    }
}

impl IntentInterpreter for KeywordInterpreter {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn interpret<'a>(
        &'a self,
        utterance: &'a str,
        descriptors: &'a [ToolDescriptor],
    ) -> InterpretFuture<'a> {
        Box::pin(async move { Ok(self.route(utterance, descriptors)) })
    }
}

fn tool_call(name: ToolName, arguments: Value) -> Interpretation {
    Interpretation::ToolCall(ToolCall::new(name.as_str(), arguments))
}

fn price_call(ticker: &str, crypto: bool, offered: &dyn Fn(ToolName) -> bool) -> Interpretation {
    if crypto && offered(ToolName::GetCryptoPrice) {
        let base = ticker.split('-').next().unwrap_or(ticker);
        tool_call(ToolName::GetCryptoPrice, json!({"symbol": base}))
    } else {
        tool_call(ToolName::GetStockPrice, json!({"symbol": ticker}))
    }
}

fn arithmetic_call(utterance: &str, has_market_context: bool) -> Option<ToolCall> {
    let call = |op: &str, operands: Vec<f64>| {
        ToolCall::new(
            ToolName::Arithmetic.as_str(),
            json!({"op": op, "operands": operands}),
        )
    };

    if let Some(captures) = PERCENT_RATIO.captures(utterance) {
        let part = parse_number(captures.get(1)?.as_str())?;
        let whole = parse_number(captures.get(2)?.as_str())?;
        return Some(call("percent_ratio", vec![part, whole]));
    }
    if let Some(captures) = PERCENT_OF.captures(utterance) {
        let percent = parse_number(captures.get(1)?.as_str())?;
        let base = parse_number(captures.get(2)?.as_str())?;
        return Some(call("percent_of", vec![base, percent]));
    }
    if let Some(captures) = SQRT.captures(utterance) {
        let value = parse_number(captures.get(1)?.as_str())?;
        return Some(call("sqrt", vec![value]));
    }
    if has_market_context {
        return None;
    }

    let captures = BINARY.captures(utterance)?;
    let left = parse_number(captures.get(1)?.as_str())?;
    let right = parse_number(captures.get(3)?.as_str())?;
    let operator = captures.get(2)?.as_str().to_ascii_lowercase();
    let op = match operator.split_whitespace().next()? {
        "+" | "plus" => "add",
        "-" | "minus" => "subtract",
        "*" | "×" | "x" | "times" | "multiplied" => "multiply",
        "/" | "÷" | "divided" => "divide",
        "^" | "to" => "power",
        _ => return None,
    };
    Some(call(op, vec![left, right]))
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Trailing calendar days named in the utterance (`30 days`, `2 weeks`, `a month`), within
/// `1..=MAX_SPAN_DAYS`. A count too large to parse is treated as the maximum.
fn span_days(utterance: &str) -> Option<i64> {
    let captures = SPAN.captures(utterance)?;
    let count: i64 = match captures.get(1) {
        Some(digits) => digits.as_str().parse().unwrap_or(MAX_SPAN_DAYS),
        None => 1,
    };
    let unit = captures.get(2)?.as_str().to_ascii_lowercase();
    let per_unit = if unit.starts_with("day") {
        1
    } else if unit.starts_with("week") {
        7
    } else if unit.starts_with("month") {
        30
    } else {
        365
    };
    Some(count.saturating_mul(per_unit).clamp(1, MAX_SPAN_DAYS))
}

fn history_period(utterance: &str) -> &'static str {
    if YEAR_TO_DATE.is_match(utterance) {
        return "ytd";
    }
    match span_days(utterance) {
        Some(days) if days <= 7 => "5d",
        Some(days) if days <= 31 => "1mo",
        Some(days) if days <= 92 => "3mo",
        Some(days) if days <= 183 => "6mo",
        Some(_) => "1y",
        None => "1mo",
    }
}

fn normalize_field(raw: &str) -> &'static str {
    match raw.to_ascii_lowercase().as_str() {
        "open" | "opening" => "open",
        "high" => "high",
        "low" => "low",
        "volume" => "volume",
        _ => "close",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DetectedSymbol {
    ticker: String,
    crypto: bool,
}

impl DetectedSymbol {
    fn new(ticker: &str) -> Self {
        let ticker = ticker.to_ascii_uppercase();
        let base = ticker.split('-').next().unwrap_or(&ticker);
        let crypto = CRYPTO_BASES.contains(&base);
        Self { ticker, crypto }
    }
}

/// Company names first, then `$CASHTAG`s, then upper-case tokens as typed.
fn extract_symbol(utterance: &str) -> Option<DetectedSymbol> {
    let company = WORD.find_iter(utterance).find_map(|word| {
        let upper = word.as_str().to_ascii_uppercase();
        COMPANY_TICKERS
            .iter()
            .find(|(name, _)| *name == upper)
            .map(|(_, ticker)| DetectedSymbol::new(ticker))
    });
    if company.is_some() {
        return company;
    }

    if let Some(tag) = CASHTAG.captures(utterance).and_then(|captures| captures.get(1)) {
        return Some(DetectedSymbol::new(tag.as_str()));
    }

    TICKER
        .captures_iter(utterance)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str())
        .find(|token| !STOPWORDS.contains(token))
        .map(DetectedSymbol::new)
}

const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_TEMPERATURE: f64 = 0.1;
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Interpreter backed by an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct ChatCompletionsInterpreter {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    timeout_ms: u64,
    today: Option<Date>,
}

impl ChatCompletionsInterpreter {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: String::from(DEFAULT_MODEL),
            temperature: DEFAULT_TEMPERATURE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            today: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_today(mut self, today: Date) -> Self {
        self.today = Some(today);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, utterance: &str, descriptors: &[ToolDescriptor]) -> Value {
        let today = self.today.unwrap_or_else(ferrotalk_core::today_utc);
        let tools: Vec<Value> = descriptors
            .iter()
            .map(|descriptor| {
                json!({
                    "type": "function",
                    "function": {
                        "name": descriptor.name.as_str(),
                        "description": descriptor.description,
                        "parameters": descriptor.parameters_schema(),
                    }
                })
            })
            .collect();

        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": system_prompt(today)},
                {"role": "user", "content": utterance},
            ],
            "tools": tools,
            "tool_choice": "auto",
        })
    }
}

fn system_prompt(today: Date) -> String {
    format!(
        "You are a financial assistant answering questions about stocks and cryptocurrencies. \
         Today is {today}. Call exactly one of the provided tools for any question about prices, \
         key stats, history, averages, percentage changes or arithmetic, and never compute \
         numbers yourself. \
         Use ticker symbols (AAPL, not Apple). Answer anything else briefly in plain text."
    )
}

impl IntentInterpreter for ChatCompletionsInterpreter {
    fn name(&self) -> &'static str {
        "chat_completions"
    }

    fn interpret<'a>(
        &'a self,
        utterance: &'a str,
        descriptors: &'a [ToolDescriptor],
    ) -> InterpretFuture<'a> {
        Box::pin(async move {
            let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
            let body = self.request_body(utterance, descriptors);
            let request = HttpRequest::post(url)
                .with_bearer_token(&self.api_key)
                .with_json_body(body.to_string())
                .with_timeout_ms(self.timeout_ms);

            debug!(model = %self.model, tools = descriptors.len(), "requesting interpretation");
            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|error| InterpreterError::Transport(error.message().to_owned()))?;

            if !response.is_success() {
                return Err(InterpreterError::Status {
                    status: response.status,
                    message: error_message(&response.body),
                });
            }

            parse_completion(&response.body)
        })
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Reads the first tool call, or the message content, from a completion payload.
pub fn parse_completion(body: &str) -> Result<Interpretation, InterpreterError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| InterpreterError::MalformedResponse(e.to_string()))?;
    let message = payload.pointer("/choices/0/message").ok_or_else(|| {
        InterpreterError::MalformedResponse(String::from("no choices[0].message"))
    })?;

    if let Some(function) = message.pointer("/tool_calls/0/function") {
        let name = function
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                InterpreterError::MalformedResponse(String::from("tool call without a name"))
            })?;
        let arguments = match function.get("arguments") {
            Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
            Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|e| {
                InterpreterError::MalformedResponse(format!("tool arguments are not JSON: {e}"))
            })?,
            Some(other) => other.clone(),
            None => json!({}),
        };
        return Ok(Interpretation::ToolCall(ToolCall::new(name, arguments)));
    }

    match message.get("content").and_then(Value::as_str) {
        Some(content) if !content.trim().is_empty() => {
            Ok(Interpretation::PlainAnswer(content.trim().to_owned()))
        }
        _ => Err(InterpreterError::MalformedResponse(String::from(
            "completion carried neither a tool call nor content",
        ))),
    }
}
