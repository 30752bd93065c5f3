use chrono::Datelike;
use insights_core::{AccountId, DateRange, Money};
use insights_storage::{get_transactions, DbPool, StorageError, TransactionFilter};
use insights_transfer::TransferMatching;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::read_time::matched_transfer_ids;

#[derive(Debug, Clone, Default)]
pub struct CashflowQuery {
    pub range: Option<DateRange>,
    pub account_ids: Vec<AccountId>,
    pub excluded_account_ids: Vec<AccountId>,
    pub exclude_transfers: bool,
    pub read_time_matching: bool,
}

/// One calendar month. Both sides are reported as positive sums.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashflowRow {
    pub year: i32,
    pub month: u32,
    pub money_in: Money,
    pub money_out: Money,
    pub net: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CashflowSummary {
    pub money_in: Money,
    pub money_out: Money,
    pub net: Money,
}

#[derive(Debug, Clone, Serialize)]
pub struct CashflowReport {
    pub rows: Vec<CashflowRow>,
    pub totals: CashflowSummary,
    /// Transactions left out because they were transfers.
    pub excluded_transfers: usize,
}

pub async fn monthly_cashflow<M: TransferMatching + ?Sized>(
    pool: &DbPool,
    matcher: &M,
    query: &CashflowQuery,
) -> Result<CashflowReport, StorageError> {
    let mut filter = TransactionFilter {
        account_ids: query.account_ids.clone(),
        excluded_account_ids: query.excluded_account_ids.clone(),
        ..Default::default()
    };
    if let Some(range) = query.range {
        let (from, to) = range.bounds();
        filter.from = Some(from);
        filter.to = Some(to);
    }
    let rows = get_transactions(pool, &filter).await?;

    let matched = if query.exclude_transfers && query.read_time_matching {
        Some(
            matched_transfer_ids(pool, matcher, query.range, &query.account_ids, &query.excluded_account_ids)
                .await?,
        )
    } else {
        None
    };

    let mut months: BTreeMap<(i32, u32), (Money, Money)> = BTreeMap::new();
    let mut excluded = 0;
    for tx in &rows {
        if query.exclude_transfers {
            let is_transfer = match &matched {
                Some(ids) => ids.contains(&tx.id),
                None => tx.is_bank_transfer,
            };
            if is_transfer {
                excluded += 1;
                continue;
            }
        }

        let date = tx.occurred_at.date_naive();
        let (money_in, money_out) = months
            .entry((date.year(), date.month()))
            .or_insert((Money::zero(), Money::zero()));
        if tx.amount.is_positive() {
            *money_in = *money_in + tx.amount;
        } else if tx.amount.is_negative() {
            *money_out = *money_out + tx.amount.abs();
        }
    }

    let rows: Vec<CashflowRow> = months
        .into_iter()
        .map(|((year, month), (money_in, money_out))| CashflowRow {
            year,
            month,
            money_in,
            money_out,
            net: money_in - money_out,
        })
        .collect();
    let money_in: Money = rows.iter().map(|r| r.money_in).sum();
    let money_out: Money = rows.iter().map(|r| r.money_out).sum();

    tracing::debug!(months = rows.len(), excluded, "computed cashflow");
    Ok(CashflowReport {
        rows,
        totals: CashflowSummary {
            money_in,
            money_out,
            net: money_in - money_out,
        },
        excluded_transfers: excluded,
    })
}
