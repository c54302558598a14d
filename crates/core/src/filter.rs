//! Per-subscriber filter configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which transactions a subscriber wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterMode {
    /// Every transaction.
    #[default]
    All,
    /// Native SOL transfers, optionally above a minimum.
    Sol,
    /// SPL token transfers, optionally above a minimum.
    Spl,
    /// Swaps of any kind.
    Swap,
    /// An explicit list of transaction types.
    Types,
}

impl FilterMode {
    /// Parse a mode name case-insensitively. Unknown names fall back to `All`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "sol" => FilterMode::Sol,
            "spl" => FilterMode::Spl,
            "swap" => FilterMode::Swap,
            "types" => FilterMode::Types,
            _ => FilterMode::All,
        }
    }

    /// Get string representation.
    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::All => "all",
            FilterMode::Sol => "sol",
            FilterMode::Spl => "spl",
            FilterMode::Swap => "swap",
            FilterMode::Types => "types",
        }
    }
}

impl From<String> for FilterMode {
    fn from(raw: String) -> Self {
        FilterMode::parse(&raw)
    }
}

impl From<FilterMode> for String {
    fn from(mode: FilterMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Filter settings attached to a subscriber.
///
/// Deserialization is lenient: missing fields take their defaults, so a
/// partially written record still yields a usable filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterConfig {
    pub mode: FilterMode,
    /// Minimum native transfer in SOL for `sol` mode.
    pub min_sol: f64,
    /// Minimum token amount for `spl` mode.
    pub min_token: f64,
    /// Accepted transaction types for `types` mode.
    pub types: BTreeSet<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            mode: FilterMode::All,
            min_sol: 0.0,
            min_token: 0.0,
            types: BTreeSet::new(),
        }
    }
}

impl FilterConfig {
    /// Filter in the given mode with default thresholds.
    pub fn with_mode(mode: FilterMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// `sol` filter with a minimum transfer size.
    pub fn min_sol(min_sol: f64) -> Self {
        Self {
            mode: FilterMode::Sol,
            min_sol,
            ..Default::default()
        }
    }

    /// `spl` filter with a minimum token amount.
    pub fn min_token(min_token: f64) -> Self {
        Self {
            mode: FilterMode::Spl,
            min_token,
            ..Default::default()
        }
    }

    /// `types` filter accepting the given transaction types.
    pub fn types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: FilterMode::Types,
            types: types.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Parse from stored JSON, falling back to the default filter on any error.
    pub fn from_json_lenient(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    /// Human-readable summary for chat replies.
    pub fn describe(&self) -> String {
        match self.mode {
            FilterMode::All => "all activity".to_string(),
            FilterMode::Swap => "swaps only".to_string(),
            FilterMode::Sol if self.min_sol > 0.0 => {
                format!("SOL transfers ≥ {} SOL", self.min_sol)
            }
            FilterMode::Sol => "SOL transfers".to_string(),
            FilterMode::Spl if self.min_token > 0.0 => {
                format!("token transfers ≥ {}", self.min_token)
            }
            FilterMode::Spl => "token transfers".to_string(),
            FilterMode::Types if self.types.is_empty() => "types: (none)".to_string(),
            FilterMode::Types => {
                let types: Vec<&str> = self.types.iter().map(String::as_str).collect();
                format!("types: {}", types.join(", "))
            }
        }
    }
}
