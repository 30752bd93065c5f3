use insights_core::{AccountId, DateRange, TransactionId};
use insights_storage::{get_transactions, DbPool, StorageError, TransactionFilter};
use insights_transfer::{TransferMatchCandidate, TransferMatching};
use std::collections::HashSet;

/// Ids of stored transactions that pair up as transfers, recomputed from
/// scratch. The candidate query is widened by the matcher's padding so a
/// pair with one half just outside `range` still counts.
pub async fn matched_transfer_ids<M: TransferMatching + ?Sized>(
    pool: &DbPool,
    matcher: &M,
    range: Option<DateRange>,
    account_ids: &[AccountId],
    excluded_account_ids: &[AccountId],
) -> Result<HashSet<TransactionId>, StorageError> {
    let mut filter = TransactionFilter {
        account_ids: account_ids.to_vec(),
        excluded_account_ids: excluded_account_ids.to_vec(),
        ..Default::default()
    };
    if let Some(range) = range {
        let (from, to) = range.padded_bounds(matcher.padding());
        filter.from = Some(from);
        filter.to = Some(to);
    }

    let candidates: Vec<TransferMatchCandidate> = get_transactions(pool, &filter)
        .await?
        .iter()
        .map(TransferMatchCandidate::from)
        .collect();
    let matched = matcher.find_matched_transfer_ids(&candidates);
    tracing::debug!(candidates = candidates.len(), matched = matched.len(), "read-time transfer matching");
    Ok(matched)
}
