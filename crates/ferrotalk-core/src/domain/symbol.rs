use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 20;
const CRYPTO_QUOTE_CURRENCIES: [&str; 3] = ["USD", "USDT", "EUR"];

/// Case-insensitive instrument identifier (equity ticker or crypto pair).
///
/// Only structural checks happen locally; whether an instrument exists is decided by the
/// providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            if ch.is_whitespace() || ch.is_control() {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    /// Builds the `BASE-USD` pair used to quote a cryptocurrency in dollars.
    pub fn crypto_pair(base: &str) -> Result<Self, ValidationError> {
        let base = Self::parse(base)?;
        if base.is_crypto_pair() {
            return Ok(base);
        }
        Self::parse(&format!("{}-USD", base.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits a `BASE-QUOTE` crypto pair into its two legs.
    pub fn crypto_legs(&self) -> Option<(&str, &str)> {
        let (base, quote) = self.0.rsplit_once('-')?;
        if base.is_empty() || !CRYPTO_QUOTE_CURRENCIES.contains(&quote) {
            return None;
        }
        Some((base, quote))
    }

    pub fn is_crypto_pair(&self) -> bool {
        self.crypto_legs().is_some()
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
