use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const DEFAULT_CURRENCY: &str = "NZD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        AccountId(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(AccountId)
    }
}

/// A bank account owned by the user, as last reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Identifier assigned by the upstream provider.
    pub external_id: String,
    pub name: String,
    pub institution: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Provider-side view of an account, before it has a local id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub external_id: String,
    pub name: String,
    pub institution: Option<String>,
    pub currency: String,
}

impl NewAccount {
    pub fn new(external_id: &str, name: &str) -> Self {
        NewAccount {
            external_id: external_id.to_string(),
            name: name.to_string(),
            institution: None,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}
