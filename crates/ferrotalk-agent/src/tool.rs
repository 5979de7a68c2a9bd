use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Names of the tools the dispatcher can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    GetStockPrice,
    GetCryptoPrice,
    GetStockInfo,
    GetHistoricalData,
    CalculateAveragePrice,
    PercentageChange,
    Arithmetic,
    WebSearch,
}

impl ToolName {
    pub const ALL: [Self; 8] = [
        Self::GetStockPrice,
        Self::GetCryptoPrice,
        Self::GetStockInfo,
        Self::GetHistoricalData,
        Self::CalculateAveragePrice,
        Self::PercentageChange,
        Self::Arithmetic,
        Self::WebSearch,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetStockPrice => "get_stock_price",
            Self::GetCryptoPrice => "get_crypto_price",
            Self::GetStockInfo => "get_stock_info",
            Self::GetHistoricalData => "get_historical_data",
            Self::CalculateAveragePrice => "calculate_average_price",
            Self::PercentageChange => "percentage_change",
            Self::Arithmetic => "arithmetic",
            Self::WebSearch => "web_search",
        }
    }
}

impl Display for ToolName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    /// The unrecognised name.
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == value.trim())
            .ok_or_else(|| value.to_owned())
    }
}

/// A tool invocation chosen by the interpreter for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    /// Expected to be a JSON object; anything else fails validation.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// User-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SymbolNotFound,
    ProviderUnavailable,
    InsufficientData,
    EmptySeries,
    DivisionByZero,
    InvalidArguments,
    UnknownTool,
    InterpreterUnavailable,
    SearchUnavailable,
}

impl FailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SymbolNotFound => "symbol_not_found",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::InsufficientData => "insufficient_data",
            Self::EmptySeries => "empty_series",
            Self::DivisionByZero => "division_by_zero",
            Self::InvalidArguments => "invalid_arguments",
            Self::UnknownTool => "unknown_tool",
            Self::InterpreterUnavailable => "interpreter_unavailable",
            Self::SearchUnavailable => "search_unavailable",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a successful tool run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// One-line answer for the user.
    pub summary: String,
    pub data: Value,
    /// Notes about degraded provenance (fallback provider, coarser granularity).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disclosures: Vec<String>,
}

impl ToolOutput {
    pub fn new(summary: impl Into<String>, data: Value) -> Self {
        Self {
            summary: summary.into(),
            data,
            disclosures: Vec::new(),
        }
    }

    pub fn with_disclosures(mut self, disclosures: Vec<String>) -> Self {
        self.disclosures = disclosures;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success { value: ToolOutput },
    Failure { kind: FailureKind, message: String },
}

impl ToolResult {
    pub fn success(value: ToolOutput) -> Self {
        Self::Success { value }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
