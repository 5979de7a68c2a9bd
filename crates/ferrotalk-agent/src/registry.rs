//! # Tool Registry
//!
//! Closed, versioned catalogue of tool descriptors. Each descriptor carries a typed argument
//! list that is both rendered to JSON Schema (for the interpreter) and used to validate
//! incoming [`ToolCall`]s before anything runs.
//!
//! | Tool | Arguments |
//! |------|-----------|
//! | `get_stock_price` | `symbol`, `date?` |
//! | `get_crypto_price` | `symbol` |
//! | `get_stock_info` | `symbol` |
//! | `get_historical_data` | `symbol`, `period?` |
//! | `calculate_average_price` | `symbol`, `days?`, `field?` |
//! | `percentage_change` | `symbol`, `from_date`, `to_date` |
//! | `arithmetic` | `op`, `operands` |
//! | `web_search` | `query` (only when a search backend is configured) |

use std::collections::BTreeMap;

use ferrotalk_core::{parse_date, ArithmeticOp, PriceField};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use time::Date;

use crate::tool::{ToolCall, ToolName};

/// Version of the descriptor set sent to interpreters.
pub const REGISTRY_VERSION: &str = "2024.1";

pub const HISTORY_PERIODS: &[&str] = &["5d", "1mo", "3mo", "6mo", "1y", "ytd"];
pub const DEFAULT_HISTORY_PERIOD: &str = "1mo";
pub const DEFAULT_AVERAGE_DAYS: i64 = 7;
pub const MAX_AVERAGE_DAYS: i64 = 365;

const PRICE_FIELDS: &[&str] = &["open", "high", "low", "close", "volume"];
const ARITHMETIC_OPS: &[&str] = &[
    "add",
    "subtract",
    "multiply",
    "divide",
    "percent_of",
    "percent_ratio",
    "power",
    "sqrt",
    "min",
    "max",
];

/// Accepted shape of a single argument.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgumentKind {
    String,
    Integer { minimum: i64, maximum: i64 },
    NumberList,
    Date,
    Enum { values: &'static [&'static str] },
}

impl ArgumentKind {
    fn json_schema(&self) -> Value {
        match self {
            Self::String => json!({"type": "string", "minLength": 1}),
            Self::Integer { minimum, maximum } => {
                json!({"type": "integer", "minimum": minimum, "maximum": maximum})
            }
            Self::NumberList => {
                json!({"type": "array", "items": {"type": "number"}, "minItems": 1})
            }
            Self::Date => json!({"type": "string", "format": "date"}),
            Self::Enum { values } => json!({"type": "string", "enum": values}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ArgumentKind,
    pub required: bool,
}

impl ArgumentSpec {
    const fn required(name: &'static str, description: &'static str, kind: ArgumentKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
        }
    }

    const fn optional(name: &'static str, description: &'static str, kind: ArgumentKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
        }
    }
}

/// Static description of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: ToolName,
    pub description: &'static str,
    pub arguments: Vec<ArgumentSpec>,
}

impl ToolDescriptor {
    /// JSON Schema object describing the tool's arguments.
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .arguments
            .iter()
            .map(|spec| {
                let mut schema = spec.kind.json_schema();
                if let Some(object) = schema.as_object_mut() {
                    object.insert(String::from("description"), Value::from(spec.description));
                }
                (spec.name.to_owned(), schema)
            })
            .collect();
        let required: Vec<&str> = self
            .arguments
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// Why a tool call was rejected before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CallRejection {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(ArgumentError),
}

/// Argument validation failure details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentError {
    /// Argument name, or `$` for the argument object itself.
    pub path: String,
    pub message: String,
}

impl ArgumentError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ArgumentError {}

/// A single argument value after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Text(String),
    Integer(i64),
    NumberList(Vec<f64>),
    Date(Date),
    /// Canonical (lower-case) enum member.
    Choice(&'static str),
}

/// Arguments of a validated call, typed per the descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatedArguments {
    values: BTreeMap<&'static str, ArgumentValue>,
}

impl ValidatedArguments {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            ArgumentValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            ArgumentValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn numbers(&self, name: &str) -> Option<&[f64]> {
        match self.values.get(name)? {
            ArgumentValue::NumberList(values) => Some(values),
            _ => None,
        }
    }

    pub fn date(&self, name: &str) -> Option<Date> {
        match self.values.get(name)? {
            ArgumentValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn choice(&self, name: &str) -> Option<&'static str> {
        match self.values.get(name)? {
            ArgumentValue::Choice(value) => Some(value),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A call that passed validation, ready for the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCall {
    pub tool: ToolName,
    pub arguments: ValidatedArguments,
}

/// Versioned descriptor catalogue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolRegistry {
    version: &'static str,
    descriptors: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    /// Every tool except `web_search`.
    pub fn standard() -> Self {
        Self {
            version: REGISTRY_VERSION,
            descriptors: vec![
                ToolDescriptor {
                    name: ToolName::GetStockPrice,
                    description: "Price of a stock, ETF or index by ticker symbol. Latest trade \
                                  by default, or the close on a given date.",
                    arguments: vec![
                        symbol_argument("Ticker symbol, e.g. AAPL"),
                        ArgumentSpec::optional(
                            "date",
                            "Trading date, YYYY-MM-DD. Omit for the latest price",
                            ArgumentKind::Date,
                        ),
                    ],
                },
                ToolDescriptor {
                    name: ToolName::GetCryptoPrice,
                    description: "Latest price in US dollars of a cryptocurrency.",
                    arguments: vec![symbol_argument("Cryptocurrency symbol, e.g. BTC or ETH")],
                },
                ToolDescriptor {
                    name: ToolName::GetStockInfo,
                    description: "Key trading stats of a stock: latest and previous close, \
                                  volume and 52-week high and low.",
                    arguments: vec![symbol_argument("Ticker symbol, e.g. AAPL")],
                },
                ToolDescriptor {
                    name: ToolName::GetHistoricalData,
                    description: "Recent daily history of a symbol: latest close, previous close \
                                  and change over the period.",
                    arguments: vec![
                        symbol_argument("Ticker symbol, e.g. MSFT"),
                        ArgumentSpec::optional(
                            "period",
                            "Lookback period, defaults to 1mo",
                            ArgumentKind::Enum { values: HISTORY_PERIODS },
                        ),
                    ],
                },
                ToolDescriptor {
                    name: ToolName::CalculateAveragePrice,
                    description: "Average daily price of a symbol over the trailing number of \
                                  calendar days.",
                    arguments: vec![
                        symbol_argument("Ticker symbol, e.g. TSLA"),
                        ArgumentSpec::optional(
                            "days",
                            "Trailing calendar days, defaults to 7",
                            ArgumentKind::Integer {
                                minimum: 1,
                                maximum: MAX_AVERAGE_DAYS,
                            },
                        ),
                        ArgumentSpec::optional(
                            "field",
                            "Price field to average, defaults to close",
                            ArgumentKind::Enum { values: PRICE_FIELDS },
                        ),
                    ],
                },
                ToolDescriptor {
                    name: ToolName::PercentageChange,
                    description: "Percentage change of the closing price between two dates.",
                    arguments: vec![
                        symbol_argument("Ticker symbol, e.g. NVDA"),
                        ArgumentSpec::required(
                            "from_date",
                            "Start date, YYYY-MM-DD",
                            ArgumentKind::Date,
                        ),
                        ArgumentSpec::required(
                            "to_date",
                            "End date, YYYY-MM-DD",
                            ArgumentKind::Date,
                        ),
                    ],
                },
                ToolDescriptor {
                    name: ToolName::Arithmetic,
                    description: "Exact arithmetic. percent_of takes [base, percent]; \
                                  percent_ratio takes [part, whole].",
                    arguments: vec![
                        ArgumentSpec::required(
                            "op",
                            "Operation to apply",
                            ArgumentKind::Enum { values: ARITHMETIC_OPS },
                        ),
                        ArgumentSpec::required(
                            "operands",
                            "Operands in order",
                            ArgumentKind::NumberList,
                        ),
                    ],
                },
            ],
        }
    }

    /// Adds the `web_search` descriptor.
    pub fn with_web_search(mut self) -> Self {
        if self.get(ToolName::WebSearch.as_str()).is_none() {
            self.descriptors.push(ToolDescriptor {
                name: ToolName::WebSearch,
                description: "Search the web for recent news or general information.",
                arguments: vec![ArgumentSpec::required(
                    "query",
                    "Search query",
                    ArgumentKind::String,
                )],
            });
        }
        self
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name.as_str() == name)
    }

    /// Checks a call against its descriptor and returns typed arguments.
    pub fn validate(&self, call: &ToolCall) -> Result<ValidatedCall, CallRejection> {
        let descriptor = self
            .get(call.tool_name.trim())
            .ok_or_else(|| CallRejection::UnknownTool(call.tool_name.clone()))?;

        let empty = Map::new();
        let object = match &call.arguments {
            Value::Object(object) => object,
            Value::Null => &empty,
            other => {
                return Err(CallRejection::InvalidArguments(ArgumentError::new(
                    "$",
                    format!("arguments must be an object, found {}", value_type_name(other)),
                )))
            }
        };

        if let Some(unexpected) = object
            .keys()
            .find(|key| !descriptor.arguments.iter().any(|spec| spec.name == key.as_str()))
        {
            return Err(CallRejection::InvalidArguments(ArgumentError::new(
                unexpected.as_str(),
                format!("unexpected argument for {}", descriptor.name),
            )));
        }

        let mut values = BTreeMap::new();
        for spec in &descriptor.arguments {
            match object.get(spec.name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(CallRejection::InvalidArguments(ArgumentError::new(
                        spec.name,
                        "required argument is missing",
                    )));
                }
                None | Some(Value::Null) => {}
                Some(raw) => {
                    let value =
                        check_argument(spec, raw).map_err(CallRejection::InvalidArguments)?;
                    values.insert(spec.name, value);
                }
            }
        }

        Ok(ValidatedCall {
            tool: descriptor.name,
            arguments: ValidatedArguments { values },
        })
    }
}

fn symbol_argument(description: &'static str) -> ArgumentSpec {
    ArgumentSpec::required("symbol", description, ArgumentKind::String)
}

fn check_argument(spec: &ArgumentSpec, raw: &Value) -> Result<ArgumentValue, ArgumentError> {
    let mismatch = |expected: &str| {
        ArgumentError::new(
            spec.name,
            format!("expected {expected}, found {}", value_type_name(raw)),
        )
    };

    match &spec.kind {
        ArgumentKind::String => match raw {
            Value::String(text) if !text.trim().is_empty() => {
                Ok(ArgumentValue::Text(text.trim().to_owned()))
            }
            Value::String(_) => Err(ArgumentError::new(spec.name, "must not be empty")),
            _ => Err(mismatch("string")),
        },
        ArgumentKind::Integer { minimum, maximum } => {
            let value = integral(raw).ok_or_else(|| mismatch("integer"))?;
            if value < *minimum || value > *maximum {
                return Err(ArgumentError::new(
                    spec.name,
                    format!("{value} is outside {minimum}..={maximum}"),
                ));
            }
            Ok(ArgumentValue::Integer(value))
        }
        ArgumentKind::NumberList => {
            let items = raw.as_array().ok_or_else(|| mismatch("array of numbers"))?;
            if items.is_empty() {
                return Err(ArgumentError::new(spec.name, "must contain at least one number"));
            }
            items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    item.as_f64().ok_or_else(|| {
                        ArgumentError::new(
                            format!("{}/{index}", spec.name),
                            format!("expected number, found {}", value_type_name(item)),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ArgumentValue::NumberList)
        }
        ArgumentKind::Date => {
            let text = raw.as_str().ok_or_else(|| mismatch("date string"))?;
            parse_date(text)
                .map(ArgumentValue::Date)
                .map_err(|e| ArgumentError::new(spec.name, e.to_string()))
        }
        ArgumentKind::Enum { values } => {
            let text = raw.as_str().ok_or_else(|| mismatch("string"))?;
            let normalized = text.trim().to_ascii_lowercase();
            values
                .iter()
                .find(|candidate| **candidate == normalized)
                .map(|candidate| ArgumentValue::Choice(*candidate))
                .ok_or_else(|| {
                    ArgumentError::new(
                        spec.name,
                        format!("'{text}' is not one of {}", values.join(", ")),
                    )
                })
        }
    }
}

fn integral(raw: &Value) -> Option<i64> {
    if let Some(value) = raw.as_i64() {
        return Some(value);
    }
    raw.as_f64()
        .filter(|value| value.fract() == 0.0 && value.abs() < 9.0e15)
        .map(|value| value as i64)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses an `op` choice produced by validation.
pub(crate) fn arithmetic_op(choice: &str) -> Option<ArithmeticOp> {
    choice.parse().ok()
}

/// Parses a `field` choice produced by validation.
pub(crate) fn price_field(choice: &str) -> Option<PriceField> {
    choice.parse().ok()
}
