use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Ticker symbol identifying a tracked equity.
///
/// Symbols are normalized to upper case so that `aapl` and `AAPL` address the
/// same rows in storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a ticker string.
    ///
    /// # Errors
    /// Returns an error if the ticker is empty or contains characters that
    /// cannot appear in an exchange ticker (e.g. "BRK-B", "^GSPC" and "ES=F"
    /// are accepted, "AAPL@" is not).
    pub fn new(ticker: impl AsRef<str>) -> Result<Self, SymbolError> {
        let ticker = ticker.as_ref().trim();
        if ticker.is_empty() {
            return Err(SymbolError::Empty);
        }

        if let Some(c) = ticker
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '^' | '=')))
        {
            return Err(SymbolError::InvalidCharacter(c));
        }

        Ok(Symbol(ticker.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Symbol::new(value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when validating a ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol cannot be empty")]
    Empty,
    #[error("symbol contains invalid character '{0}'")]
    InvalidCharacter(char),
}
