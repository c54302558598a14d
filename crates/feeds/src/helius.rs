//! Helius enhanced-transactions client.
//!
//! Fetches the latest parsed transactions for a wallet from the Helius REST
//! API and the native balance from a Solana JSON-RPC node. Failures are
//! logged and reported as an empty page or unknown balance.

use crate::error::FeedError;
use async_trait::async_trait;
use compact_str::CompactString;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use walletwatch_core::{
    lamports_to_sol, NativeTransfer, TokenTransfer, Transaction, WalletAddress,
};
use walletwatch_engine::TransactionSource;

/// Connection settings for Helius and the RPC node.
#[derive(Clone)]
pub struct HeliusConfig {
    pub api_key: String,
    /// Base URL of the enhanced-transactions API.
    pub api_base_url: String,
    /// Solana JSON-RPC endpoint for balances.
    pub rpc_url: String,
    /// Transactions requested per poll.
    pub page_limit: u32,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for HeliusConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeliusConfig")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("rpc_url", &self.rpc_url)
            .field("page_limit", &self.page_limit)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://api.helius.xyz".to_string(),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            page_limit: 20,
            request_timeout: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// Wire format
// ============================================================================

// Field-level leniency: a bad value degrades to its default instead of
// discarding the whole signed record.

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

/// A non-array becomes empty; elements that are not objects are skipped.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter(serde_json::Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNativeTransfer {
    #[serde(default, alias = "fromAccount", deserialize_with = "lenient_string")]
    from_user_account: Option<String>,
    #[serde(default, alias = "toAccount", deserialize_with = "lenient_string")]
    to_user_account: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTokenTransfer {
    #[serde(default, alias = "fromAccount", deserialize_with = "lenient_string")]
    from_user_account: Option<String>,
    #[serde(default, alias = "toAccount", deserialize_with = "lenient_string")]
    to_user_account: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    token_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    mint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    #[serde(default, deserialize_with = "lenient_string")]
    signature: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    native_transfers: Vec<RawNativeTransfer>,
    #[serde(default, deserialize_with = "lenient_list")]
    token_transfers: Vec<RawTokenTransfer>,
}

fn non_empty(s: Option<String>) -> Option<CompactString> {
    s.filter(|s| !s.is_empty()).map(CompactString::from)
}

impl RawTransaction {
    /// Convert to the domain type. Records without a signature are dropped.
    fn into_transaction(self) -> Option<Transaction> {
        let signature = non_empty(self.signature)?;

        let native_transfers = self
            .native_transfers
            .into_iter()
            .map(|t| NativeTransfer {
                amount: t.amount.unwrap_or(0.0).max(0.0).round() as u64,
                from: non_empty(t.from_user_account),
                to: non_empty(t.to_user_account),
            })
            .collect();

        let token_transfers = self
            .token_transfers
            .into_iter()
            .map(|t| TokenTransfer {
                token_amount: t.token_amount.unwrap_or(0.0),
                mint: t.mint.map(CompactString::from).unwrap_or_default(),
                from: non_empty(t.from_user_account),
                to: non_empty(t.to_user_account),
            })
            .collect();

        Some(Transaction {
            signature,
            kind: self.kind.map(CompactString::from).unwrap_or_default(),
            native_transfers,
            token_transfers,
        })
    }
}

/// Parse an enhanced-transactions response body.
///
/// Records without a signature, or that are not objects, are skipped rather
/// than failing the page. Malformed fields inside a signed record fall back
/// to their defaults so the record is still alerted on.
pub fn parse_transactions(body: serde_json::Value) -> Result<Vec<Transaction>, FeedError> {
    let items = match body {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(FeedError::ParseError(format!(
                "expected array, got {}",
                json_kind(&other)
            )))
        }
    };

    let total = items.len();
    let txs: Vec<Transaction> = items
        .into_iter()
        .filter(serde_json::Value::is_object)
        .filter_map(|item| serde_json::from_value::<RawTransaction>(item).ok())
        .filter_map(RawTransaction::into_transaction)
        .collect();

    if txs.len() < total {
        debug!(
            dropped = total - txs.len(),
            "Skipped unsigned or malformed transaction records"
        );
    }
    Ok(txs)
}

/// Parse a `getBalance` JSON-RPC response into SOL.
pub fn parse_balance(body: &serde_json::Value) -> Result<f64, FeedError> {
    if let Some(err) = body.get("error") {
        let message = err["message"].as_str().unwrap_or("unknown error");
        return Err(FeedError::Rpc(message.to_string()));
    }
    let lamports = body["result"]["value"].as_u64().unwrap_or(0);
    Ok(lamports_to_sol(lamports))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

// ============================================================================
// Client
// ============================================================================

/// Transaction source backed by Helius and a Solana RPC node.
pub struct HeliusClient {
    config: HeliusConfig,
    http: Client,
}

impl HeliusClient {
    /// Create a new client.
    pub fn new(config: HeliusConfig) -> Result<Self, FeedError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(FeedError::from)?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &HeliusConfig {
        &self.config
    }

    async fn try_fetch_transactions(
        &self,
        wallet: &WalletAddress,
    ) -> Result<Vec<Transaction>, FeedError> {
        let url = format!(
            "{}/v0/addresses/{}/transactions",
            self.config.api_base_url.trim_end_matches('/'),
            wallet
        );

        let limit = self.config.page_limit.to_string();

        let response = self
            .http
            .get(&url)
            .query(&[
                ("api-key", self.config.api_key.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::HttpStatus(response.status().as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        parse_transactions(body)
    }

    async fn try_fetch_balance(&self, wallet: &WalletAddress) -> Result<f64, FeedError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "get-balance",
            "method": "getBalance",
            "params": [wallet.as_str()],
        });

        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::HttpStatus(response.status().as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        parse_balance(&body)
    }
}

#[async_trait]
impl TransactionSource for HeliusClient {
    async fn fetch_recent_transactions(&self, wallet: &WalletAddress) -> Vec<Transaction> {
        match self.try_fetch_transactions(wallet).await {
            Ok(txs) => txs,
            Err(e @ FeedError::HttpStatus(_)) if !e.is_transient() => {
                warn!(wallet = %wallet, error = %e, "Helius: transactions request rejected");
                Vec::new()
            }
            Err(e) => {
                debug!(wallet = %wallet, error = %e, "Helius: failed to fetch transactions");
                Vec::new()
            }
        }
    }

    async fn fetch_balance(&self, wallet: &WalletAddress) -> Option<f64> {
        match self.try_fetch_balance(wallet).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                debug!(wallet = %wallet, error = %e, "RPC: failed to fetch balance");
                None
            }
        }
    }
}
