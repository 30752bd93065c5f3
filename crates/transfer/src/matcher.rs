use chrono::{DateTime, Duration, Utc};
use insights_core::{AccountId, Money, Transaction, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::pairing::{for_each_pair_in_window, PairKey};
use crate::settings::MatcherSettings;

/// Minimal projection of a transaction needed to pair it with another.
/// Built per query and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferMatchCandidate {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
}

impl From<&Transaction> for TransferMatchCandidate {
    fn from(tx: &Transaction) -> Self {
        TransferMatchCandidate {
            id: tx.id,
            account_id: tx.account_id,
            amount: tx.amount,
            timestamp: tx.occurred_at,
        }
    }
}

/// Recomputes transfer pairs from a candidate set without touching storage.
pub trait TransferMatching: Send + Sync {
    /// Ids of every candidate that takes part in at least one transfer pair.
    fn find_matched_transfer_ids(&self, candidates: &[TransferMatchCandidate]) -> HashSet<TransactionId>;

    /// How far beyond a visible range callers must widen their candidate
    /// query so that pairs straddling the edge are still found.
    fn padding(&self) -> Duration;
}

/// Read-time matcher: two candidates form a transfer when they sit in
/// different accounts, carry strictly opposite amounts of equal size, and
/// are at most `window` apart. A candidate may match several others.
#[derive(Debug, Clone)]
pub struct TransferMatcher {
    pub window: Duration,
}

impl Default for TransferMatcher {
    fn default() -> Self {
        Self::new(&MatcherSettings::default())
    }
}

impl TransferMatcher {
    pub fn new(settings: &MatcherSettings) -> Self {
        Self {
            window: settings.window(),
        }
    }
}

impl TransferMatching for TransferMatcher {
    fn find_matched_transfer_ids(&self, candidates: &[TransferMatchCandidate]) -> HashSet<TransactionId> {
        let mut matched = HashSet::new();

        for_each_pair_in_window(
            candidates,
            |c| PairKey {
                amount: c.amount,
                at: c.timestamp,
                id: c.id,
            },
            self.window,
            |i, j| {
                let (left, right) = (&candidates[i], &candidates[j]);
                if left.account_id == right.account_id {
                    return;
                }
                if !left.amount.has_opposite_sign(right.amount) {
                    return;
                }
                matched.insert(left.id);
                matched.insert(right.id);
            },
        );

        tracing::debug!(
            candidates = candidates.len(),
            matched = matched.len(),
            "read-time transfer matching finished"
        );
        matched
    }

    fn padding(&self) -> Duration {
        self.window
    }
}
