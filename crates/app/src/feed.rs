use chrono::{DateTime, Utc};
use insights_core::{AccountId, DateRange, Direction, Money, Transaction, TransactionId};
use insights_storage::{get_transactions, DbPool, StorageError, TransactionFilter};
use insights_transfer::TransferMatching;
use serde::Serialize;

use crate::read_time::matched_transfer_ids;

pub const DEFAULT_FEED_LIMIT: u32 = 5000;

#[derive(Debug, Clone)]
pub struct FeedQuery {
    pub range: Option<DateRange>,
    pub account_ids: Vec<AccountId>,
    pub direction: Option<Direction>,
    pub include_transfers: bool,
    /// Recompute transfers with the matcher instead of trusting the stored flag.
    pub read_time_matching: bool,
    pub limit: u32,
}

impl Default for FeedQuery {
    fn default() -> Self {
        Self {
            range: None,
            account_ids: Vec::new(),
            direction: None,
            include_transfers: true,
            read_time_matching: false,
            limit: DEFAULT_FEED_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub amount: Money,
    pub direction: Direction,
    pub description: String,
    pub merchant_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub is_bank_transfer: bool,
}

impl From<Transaction> for FeedItem {
    fn from(tx: Transaction) -> Self {
        FeedItem {
            id: tx.id,
            account_id: tx.account_id,
            amount: tx.amount,
            direction: tx.direction,
            description: tx.description,
            merchant_name: tx.merchant_name,
            occurred_at: tx.occurred_at,
            is_bank_transfer: tx.is_bank_transfer,
        }
    }
}

/// Newest-first transaction listing with optional transfer exclusion.
pub async fn transaction_feed<M: TransferMatching + ?Sized>(
    pool: &DbPool,
    matcher: &M,
    query: &FeedQuery,
) -> Result<Vec<FeedItem>, StorageError> {
    let mut filter = TransactionFilter {
        account_ids: query.account_ids.clone(),
        direction: query.direction,
        ..Default::default()
    };
    if let Some(range) = query.range {
        let (from, to) = range.bounds();
        filter.from = Some(from);
        filter.to = Some(to);
    }

    if !query.read_time_matching {
        filter.only_unflagged = !query.include_transfers;
        filter.limit = Some(query.limit);
        let rows = get_transactions(pool, &filter).await?;
        return Ok(rows.into_iter().map(FeedItem::from).collect());
    }

    let matched = matched_transfer_ids(pool, matcher, query.range, &query.account_ids, &[]).await?;
    let mut items: Vec<FeedItem> = get_transactions(pool, &filter)
        .await?
        .into_iter()
        .map(|mut tx| {
            tx.is_bank_transfer = matched.contains(&tx.id);
            FeedItem::from(tx)
        })
        .filter(|item| query.include_transfers || !item.is_bank_transfer)
        .collect();
    items.truncate(query.limit as usize);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ledger, today};
    use chrono::Duration;
    use insights_storage::save_transfer_flags;
    use insights_transfer::{TransferMatchCandidate, TransferMatcher};

    fn last_days(days: i64) -> Option<DateRange> {
        Some(DateRange::new(today() - Duration::days(days), today()))
    }

    fn descriptions(items: &[FeedItem]) -> Vec<&str> {
        items.iter().map(|i| i.description.as_str()).collect()
    }

    #[tokio::test]
    async fn read_time_feed_tags_pairs() {
        let fx = ledger().await;
        let query = FeedQuery {
            range: last_days(10),
            read_time_matching: true,
            ..Default::default()
        };
        let items = transaction_feed(&fx.pool, &TransferMatcher::default(), &query).await.unwrap();

        assert_eq!(items.len(), 4);
        let mut tagged: Vec<&str> = items.iter().filter(|i| i.is_bank_transfer).map(|i| i.description.as_str()).collect();
        tagged.sort();
        assert_eq!(tagged, vec!["Transfer candidate in", "Transfer candidate out"]);
    }

    #[tokio::test]
    async fn read_time_feed_excludes_pairs() {
        let fx = ledger().await;
        let query = FeedQuery {
            range: last_days(10),
            read_time_matching: true,
            include_transfers: false,
            ..Default::default()
        };
        let items = transaction_feed(&fx.pool, &TransferMatcher::default(), &query).await.unwrap();
        assert_eq!(descriptions(&items), vec!["Salary part", "Card payment"]);
    }

    #[tokio::test]
    async fn counterpart_outside_range_still_tags() {
        let fx = ledger().await;
        let query = FeedQuery {
            range: last_days(4),
            read_time_matching: true,
            ..Default::default()
        };
        let items = transaction_feed(&fx.pool, &TransferMatcher::default(), &query).await.unwrap();

        assert_eq!(items.len(), 3);
        let incoming = items.iter().find(|i| i.description == "Transfer candidate in").unwrap();
        assert!(incoming.is_bank_transfer);
    }

    #[tokio::test]
    async fn matching_only_visible_rows_misses_the_pair() {
        let fx = ledger().await;
        let (from, to) = last_days(4).unwrap().bounds();
        let visible: Vec<TransferMatchCandidate> = get_transactions(&fx.pool, &TransactionFilter::between(from, to))
            .await
            .unwrap()
            .iter()
            .map(TransferMatchCandidate::from)
            .collect();

        assert!(TransferMatcher::default().find_matched_transfer_ids(&visible).is_empty());
    }

    #[tokio::test]
    async fn persisted_feed_uses_stored_flags() {
        let fx = ledger().await;
        let mut rows = get_transactions(&fx.pool, &TransactionFilter::default()).await.unwrap();
        for tx in rows.iter_mut().filter(|t| t.description == "Card payment") {
            tx.is_bank_transfer = true;
        }
        save_transfer_flags(&fx.pool, &rows).await.unwrap();

        let query = FeedQuery {
            range: last_days(10),
            include_transfers: false,
            ..Default::default()
        };
        let items = transaction_feed(&fx.pool, &TransferMatcher::default(), &query).await.unwrap();
        assert_eq!(
            descriptions(&items),
            vec!["Salary part", "Transfer candidate in", "Transfer candidate out"]
        );
    }

    #[tokio::test]
    async fn direction_account_and_limit() {
        let fx = ledger().await;
        let query = FeedQuery {
            account_ids: vec![fx.b.id],
            direction: Some(Direction::In),
            limit: 1,
            ..Default::default()
        };
        let items = transaction_feed(&fx.pool, &TransferMatcher::default(), &query).await.unwrap();
        assert_eq!(descriptions(&items), vec!["Salary part"]);

        let query = FeedQuery {
            account_ids: vec![fx.a.id],
            read_time_matching: true,
            limit: 1,
            ..Default::default()
        };
        let items = transaction_feed(&fx.pool, &TransferMatcher::default(), &query).await.unwrap();
        assert_eq!(descriptions(&items), vec!["Card payment"]);
        assert!(!items[0].is_bank_transfer);
    }
}
