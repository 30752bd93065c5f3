use insights_core::Transaction;
use serde::Serialize;

use crate::pairing::{for_each_pair_in_window, PairKey};
use crate::settings::ClassifierSettings;
use crate::text::{contains_keyword, token_overlap};

/// Counts from one classification run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationSummary {
    /// Flagged by the keyword pass.
    pub keyword_tagged: usize,
    /// Flagged by the pairing pass, counting each side once per pair found.
    pub pair_tagged: usize,
    /// Transactions carrying the flag once the run is over.
    pub total_flagged: usize,
}

/// Sync-time classifier that writes `is_bank_transfer` on a batch.
///
/// The caller owns the batch and persists the flags afterwards.
pub trait TransferClassification: Send + Sync {
    fn classify(&self, transactions: &mut [Transaction]) -> ClassificationSummary;
}

pub struct TransferClassifier {
    settings: ClassifierSettings,
}

impl Default for TransferClassifier {
    fn default() -> Self {
        Self::new(ClassifierSettings::default())
    }
}

impl TransferClassifier {
    pub fn new(settings: ClassifierSettings) -> Self {
        Self { settings }
    }

    fn has_keyword(&self, description: &str) -> bool {
        contains_keyword(description, &self.settings.keywords)
    }

    /// Either side names a transfer, or the two descriptions share enough words.
    fn descriptions_agree(&self, left: &str, right: &str) -> bool {
        self.has_keyword(left)
            || self.has_keyword(right)
            || token_overlap(left, right, self.settings.min_token_len) > self.settings.similarity_threshold
    }
}

impl TransferClassification for TransferClassifier {
    fn classify(&self, transactions: &mut [Transaction]) -> ClassificationSummary {
        let mut summary = ClassificationSummary::default();

        if self.settings.reset_flags {
            for tx in transactions.iter_mut() {
                tx.is_bank_transfer = false;
            }
        }

        // Keyword pass. Flags only ever go from false to true.
        for tx in transactions.iter_mut() {
            if self.has_keyword(&tx.description) {
                tx.is_bank_transfer = true;
                summary.keyword_tagged += 1;
            }
        }

        // Pairing pass, gated on descriptions.
        let mut paired = Vec::new();
        let batch: &[Transaction] = transactions;
        for_each_pair_in_window(
            batch,
            |tx| PairKey {
                amount: tx.amount,
                at: tx.occurred_at,
                id: tx.id,
            },
            self.settings.window(),
            |i, j| {
                let (left, right) = (&batch[i], &batch[j]);
                if left.account_id == right.account_id {
                    return;
                }
                if !left.amount.has_opposite_sign(right.amount) {
                    return;
                }
                if self.descriptions_agree(&left.description, &right.description) {
                    paired.push(i);
                    paired.push(j);
                }
            },
        );
        summary.pair_tagged = paired.len();
        for idx in paired {
            transactions[idx].is_bank_transfer = true;
        }

        summary.total_flagged = transactions.iter().filter(|tx| tx.is_bank_transfer).count();
        tracing::debug!(
            batch = transactions.len(),
            keyword_tagged = summary.keyword_tagged,
            pair_tagged = summary.pair_tagged,
            total_flagged = summary.total_flagged,
            "transfer classification finished"
        );
        summary
    }
}
