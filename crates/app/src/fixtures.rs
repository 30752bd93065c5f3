//! Two-account ledger shared by the service tests.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use insights_core::{Account, Money, NewAccount, NewTransaction};
use insights_storage::{create_memory_db, upsert_account, upsert_transaction, DbPool};

pub(crate) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 20).unwrap()
}

/// Noon UTC, `days` before [`today`].
pub(crate) fn days_ago(days: i64) -> DateTime<Utc> {
    Utc.from_utc_datetime(&(today() - Duration::days(days)).and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()))
}

pub(crate) fn new_tx(external_id: &str, account: &Account, cents: i64, desc: &str, occurred_at: DateTime<Utc>) -> NewTransaction {
    NewTransaction {
        external_id: external_id.to_string(),
        account_id: account.id,
        amount: Money::from_cents(cents),
        description: desc.to_string(),
        merchant_name: None,
        occurred_at,
    }
}

pub(crate) struct Ledger {
    pub pool: DbPool,
    pub a: Account,
    pub b: Account,
}

/// A: -100 six days ago, -40 two days ago.
/// B: +100 three days ago, +80 yesterday.
/// The two hundreds are a transfer; nothing is flagged in storage.
pub(crate) async fn ledger() -> Ledger {
    let pool = create_memory_db().await.unwrap();
    let a = upsert_account(&pool, &NewAccount::new("acc_a", "Everyday")).await.unwrap();
    let b = upsert_account(&pool, &NewAccount::new("acc_b", "Savings")).await.unwrap();

    for tx in [
        new_tx("a_out", &a, -10_000, "Transfer candidate out", days_ago(6)),
        new_tx("a_card", &a, -4_000, "Card payment", days_ago(2)),
        new_tx("b_in", &b, 10_000, "Transfer candidate in", days_ago(3)),
        new_tx("b_salary", &b, 8_000, "Salary part", days_ago(1)),
    ] {
        upsert_transaction(&pool, &tx).await.unwrap();
    }

    Ledger { pool, a, b }
}
