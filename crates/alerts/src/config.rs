//! Alert log records and chat filter settings.

use serde::{Deserialize, Serialize};
use walletwatch_core::{FilterConfig, FilterMode};

/// Entries kept per alert log key.
pub const MAX_ALERTS_PER_KEY: i64 = 50;

/// One delivered alert, as stored in the alert log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertLogEntry {
    /// Epoch milliseconds.
    pub time_ms: i64,
    pub message: String,
}

/// Parse the argument of `/filter`.
///
/// Accepted forms:
/// - `all`, `swap`
/// - `sol [min]`, `spl [min]`
/// - `types SWAP,TRANSFER`
///
/// Unlike stored filters, an unknown mode here is rejected so the user gets
/// feedback instead of a silent `all`.
pub fn parse_filter_args(args: &str) -> Result<FilterConfig, String> {
    let mut parts = args.split_whitespace();
    let mode = parts.next().ok_or_else(|| "missing mode".to_string())?;
    let rest: Vec<&str> = parts.collect();

    let threshold = |what: &str| -> Result<f64, String> {
        match rest.first() {
            None => Ok(0.0),
            Some(raw) => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
                _ => Err(format!("invalid {} threshold: {}", what, raw)),
            },
        }
    };

    match mode.to_ascii_lowercase().as_str() {
        "all" => Ok(FilterConfig::with_mode(FilterMode::All)),
        "swap" => Ok(FilterConfig::with_mode(FilterMode::Swap)),
        "sol" => Ok(FilterConfig::min_sol(threshold("SOL")?)),
        "spl" => Ok(FilterConfig::min_token(threshold("token")?)),
        "types" => {
            let types: Vec<String> = rest
                .join(" ")
                .split(',')
                .map(|t| t.trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect();
            if types.is_empty() {
                return Err("types mode needs at least one type".to_string());
            }
            Ok(FilterConfig::types(types))
        }
        other => Err(format!("unknown mode: {}", other)),
    }
}
