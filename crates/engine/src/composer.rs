//! Alert scoring and message formatting.

use std::fmt;
use walletwatch_core::{lamports_to_sol, Headline, Transaction, WalletAddress};

/// Characters kept at each end of a wallet address in alert text.
const WALLET_DISPLAY_CHARS: usize = 4;

const BASE_SCORE: i32 = 30;
const SWAP_BONUS: i32 = 20;
const MANY_TOKEN_TRANSFERS: usize = 3;
const MANY_TOKEN_TRANSFERS_BONUS: i32 = 10;

/// Native size tiers in SOL, highest first. Only the first matching tier counts.
const SIZE_TIERS: [(f64, i32); 3] = [(100.0, 40), (25.0, 30), (5.0, 15)];

/// Letter grade derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    A,
    B,
    C,
}

impl Grade {
    fn from_value(value: u8) -> Self {
        if value >= 80 {
            Grade::A
        } else if value >= 60 {
            Grade::B
        } else {
            Grade::C
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
        };
        f.write_str(s)
    }
}

/// Heuristic interest score of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Score {
    /// 0..=100
    pub value: u8,
    pub grade: Grade,
}

/// Score a transaction by type, native size and token activity.
pub fn score(tx: &Transaction) -> Score {
    let mut value = BASE_SCORE;

    if tx.is_swap() {
        value += SWAP_BONUS;
    }

    let max_sol = lamports_to_sol(tx.max_native_lamports());
    if let Some((_, bonus)) = SIZE_TIERS.iter().find(|(min, _)| max_sol >= *min) {
        value += bonus;
    }

    if tx.token_transfers.len() >= MANY_TOKEN_TRANSFERS {
        value += MANY_TOKEN_TRANSFERS_BONUS;
    }

    let value = value.clamp(0, 100) as u8;
    Score {
        value,
        grade: Grade::from_value(value),
    }
}

/// Escape text for Telegram HTML parse mode.
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

fn account(acc: Option<&str>) -> String {
    match acc {
        Some(a) if !a.is_empty() => escape_html(a),
        _ => "?".to_string(),
    }
}

/// Format a transaction as an alert message (Telegram HTML).
///
/// Deterministic for the same inputs; only `balance` is expected to vary
/// between calls for the same transaction.
pub fn compose(wallet: &WalletAddress, balance: Option<f64>, tx: &Transaction) -> String {
    let score = score(tx);

    let mut msg = format!(
        "🔔 <b>NEW ACTIVITY</b>\n\
         Wallet: <code>{}</code>\n\
         Quality: <b>{}</b> ({}/100)\n",
        escape_html(&wallet.abbreviated(WALLET_DISPLAY_CHARS)),
        score.grade,
        score.value
    );

    if let Some(balance) = balance {
        msg.push_str(&format!("Balance: <b>{:.4} SOL</b>\n", balance));
    }

    match tx.headline() {
        Headline::Native(t) => {
            msg.push_str(&format!("Transfer: <b>{:.4} SOL</b>\n", t.sol()));
            msg.push_str(&format!("From: <code>{}</code>\n", account(t.from.as_deref())));
            msg.push_str(&format!("To: <code>{}</code>\n", account(t.to.as_deref())));
        }
        Headline::Token(t) => {
            msg.push_str(&format!("Token: <b>{}</b>\n", t.token_amount));
            msg.push_str(&format!("Mint: <code>{}</code>\n", escape_html(&t.mint)));
            msg.push_str(&format!("From: <code>{}</code>\n", account(t.from.as_deref())));
            msg.push_str(&format!("To: <code>{}</code>\n", account(t.to.as_deref())));
        }
        Headline::Bare(kind) => {
            let kind = if kind.is_empty() { "UNKNOWN" } else { kind };
            msg.push_str(&format!("Type: <b>{}</b>\n", escape_html(kind)));
        }
    }

    msg.push_str(&format!("Tx: <code>{}</code>", escape_html(&tx.signature)));
    msg
}
