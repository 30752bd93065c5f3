use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::account::AccountId;
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(TransactionId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    /// Zero amounts count as money in.
    pub fn of(amount: Money) -> Self {
        if amount.is_negative() {
            Direction::Out
        } else {
            Direction::In
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "in"),
            Direction::Out => write!(f, "out"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            other => Err(format!("Unknown direction: '{other}'")),
        }
    }
}

/// A stored bank transaction.
///
/// `is_bank_transfer` is a cached heuristic result written by the sync-time
/// classifier. Read paths may ignore it and recompute transfers instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub external_id: String,
    pub account_id: AccountId,
    pub amount: Money,
    pub direction: Direction,
    pub description: String,
    pub merchant_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub is_bank_transfer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        account_id: AccountId,
        amount: Money,
        description: &str,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let id = TransactionId::new();
        let now = Utc::now();
        Transaction {
            id,
            external_id: id.to_string(),
            account_id,
            amount,
            direction: Direction::of(amount),
            description: description.to_string(),
            merchant_name: None,
            occurred_at,
            is_bank_transfer: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Provider-side view of a transaction, keyed by its external id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub external_id: String,
    pub account_id: AccountId,
    pub amount: Money,
    pub description: String,
    pub merchant_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
