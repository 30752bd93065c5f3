use chrono::{DateTime, Utc};
use insights_core::{Account, AccountId, Direction, Money, NewAccount, NewTransaction, Transaction, TransactionId};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(Money),
}

fn corrupt(table: &'static str, message: impl Into<String>) -> StorageError {
    StorageError::Corrupt {
        table,
        message: message.into(),
    }
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    init(&pool).await?;
    Ok(pool)
}

/// Private in-memory database. The single connection is never recycled,
/// since closing it would drop the data.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    init(&pool).await?;
    Ok(pool)
}

async fn init(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    run_migrations(pool).await
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            institution TEXT,
            currency TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            external_id TEXT NOT NULL UNIQUE,
            account_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            direction TEXT NOT NULL,
            description TEXT NOT NULL,
            merchant_name TEXT,
            -- unix milliseconds
            occurred_at INTEGER NOT NULL,
            is_bank_transfer INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (account_id) REFERENCES accounts(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_transactions_occurred_at ON transactions (occurred_at)")
        .execute(pool)
        .await?;

    Ok(())
}

// ── Accounts ──────────────────────────────────────────────────────────────────

type AccountRow = (String, String, String, Option<String>, String, i64, i64);

fn timestamp(table: &'static str, secs: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| corrupt(table, format!("timestamp {secs} out of range")))
}

fn timestamp_millis(table: &'static str, millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| corrupt(table, format!("timestamp {millis}ms out of range")))
}

fn row_to_account(r: AccountRow) -> Result<Account, StorageError> {
    let id = AccountId::from_str(&r.0).map_err(|e| corrupt("accounts", e.to_string()))?;
    Ok(Account {
        id,
        external_id: r.1,
        name: r.2,
        institution: r.3,
        currency: r.4,
        created_at: timestamp("accounts", r.5)?,
        updated_at: timestamp("accounts", r.6)?,
    })
}

/// Insert or refresh an account keyed by its provider id. The local id is
/// assigned once and kept across syncs.
pub async fn upsert_account(pool: &DbPool, account: &NewAccount) -> Result<Account, StorageError> {
    let now = Utc::now().timestamp();
    let row = sqlx::query_as::<_, AccountRow>(
        r#"
        INSERT INTO accounts (id, external_id, name, institution, currency, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO UPDATE SET
            name = excluded.name,
            institution = excluded.institution,
            currency = excluded.currency,
            updated_at = excluded.updated_at
        RETURNING id, external_id, name, institution, currency, created_at, updated_at
        "#,
    )
    .bind(AccountId::new().to_string())
    .bind(&account.external_id)
    .bind(&account.name)
    .bind(&account.institution)
    .bind(&account.currency)
    .bind(now)
    .bind(now)
    .fetch_one(pool)
    .await?;

    row_to_account(row)
}

pub async fn get_accounts(pool: &DbPool) -> Result<Vec<Account>, StorageError> {
    let rows = sqlx::query_as::<_, AccountRow>(
        "SELECT id, external_id, name, institution, currency, created_at, updated_at FROM accounts ORDER BY name, external_id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(row_to_account).collect()
}

// ── Transactions ──────────────────────────────────────────────────────────────

const TRANSACTION_COLUMNS: &str = "id, external_id, account_id, amount_cents, direction, description, merchant_name, occurred_at, is_bank_transfer, created_at, updated_at";

type TransactionRow = (String, String, String, i64, String, String, Option<String>, i64, i64, i64, i64);

fn row_to_transaction(r: TransactionRow) -> Result<Transaction, StorageError> {
    let table = "transactions";
    Ok(Transaction {
        id: TransactionId::from_str(&r.0).map_err(|e| corrupt(table, e.to_string()))?,
        external_id: r.1,
        account_id: AccountId::from_str(&r.2).map_err(|e| corrupt(table, e.to_string()))?,
        amount: Money::from_cents(r.3),
        direction: Direction::from_str(&r.4).map_err(|e| corrupt(table, e))?,
        description: r.5,
        merchant_name: r.6,
        occurred_at: timestamp_millis(table, r.7)?,
        is_bank_transfer: r.8 != 0,
        created_at: timestamp(table, r.9)?,
        updated_at: timestamp(table, r.10)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(TransactionId),
    Updated(TransactionId),
}

impl UpsertOutcome {
    pub fn id(self) -> TransactionId {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}

/// Insert or refresh a transaction keyed by its provider id.
/// The stored transfer flag is left as it is. `occurred_at` keeps
/// millisecond precision; anything finer is truncated.
pub async fn upsert_transaction(pool: &DbPool, tx: &NewTransaction) -> Result<UpsertOutcome, StorageError> {
    let cents = tx.amount.to_cents().ok_or(StorageError::AmountOutOfRange(tx.amount))?;
    let direction = Direction::of(tx.amount).to_string();
    let now = Utc::now().timestamp();

    let existing = sqlx::query_as::<_, (String,)>("SELECT id FROM transactions WHERE external_id = ?")
        .bind(&tx.external_id)
        .fetch_optional(pool)
        .await?;

    if let Some((id,)) = existing {
        sqlx::query(
            r#"
            UPDATE transactions
            SET account_id = ?, amount_cents = ?, direction = ?, description = ?,
                merchant_name = ?, occurred_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(tx.account_id.to_string())
        .bind(cents)
        .bind(&direction)
        .bind(&tx.description)
        .bind(&tx.merchant_name)
        .bind(tx.occurred_at.timestamp_millis())
        .bind(now)
        .bind(&id)
        .execute(pool)
        .await?;

        let id = TransactionId::from_str(&id).map_err(|e| corrupt("transactions", e.to_string()))?;
        return Ok(UpsertOutcome::Updated(id));
    }

    let id = TransactionId::new();
    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, external_id, account_id, amount_cents, direction, description,
             merchant_name, occurred_at, is_bank_transfer, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&tx.external_id)
    .bind(tx.account_id.to_string())
    .bind(cents)
    .bind(&direction)
    .bind(&tx.description)
    .bind(&tx.merchant_name)
    .bind(tx.occurred_at.timestamp_millis())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(UpsertOutcome::Inserted(id))
}

/// Row selection for [`get_transactions`]. Empty lists and `None` bounds
/// mean "no restriction".
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_ids: Vec<AccountId>,
    pub excluded_account_ids: Vec<AccountId>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
    pub direction: Option<Direction>,
    /// Drop rows whose stored transfer flag is set.
    pub only_unflagged: bool,
    pub limit: Option<u32>,
}

impl TransactionFilter {
    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        TransactionFilter {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }
}

/// Newest first, ties broken by insertion time.
pub async fn get_transactions(pool: &DbPool, filter: &TransactionFilter) -> Result<Vec<Transaction>, StorageError> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1 = 1"));

    if !filter.account_ids.is_empty() {
        qb.push(" AND account_id IN (");
        let mut ids = qb.separated(", ");
        for id in &filter.account_ids {
            ids.push_bind(id.to_string());
        }
        ids.push_unseparated(")");
    }
    if !filter.excluded_account_ids.is_empty() {
        qb.push(" AND account_id NOT IN (");
        let mut ids = qb.separated(", ");
        for id in &filter.excluded_account_ids {
            ids.push_bind(id.to_string());
        }
        ids.push_unseparated(")");
    }
    if let Some(from) = filter.from {
        qb.push(" AND occurred_at >= ").push_bind(from.timestamp_millis());
    }
    if let Some(to) = filter.to {
        qb.push(" AND occurred_at <= ").push_bind(to.timestamp_millis());
    }
    if let Some(direction) = filter.direction {
        qb.push(" AND direction = ").push_bind(direction.to_string());
    }
    if filter.only_unflagged {
        qb.push(" AND is_bank_transfer = 0");
    }
    qb.push(" ORDER BY occurred_at DESC, created_at DESC, id DESC");
    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(i64::from(limit));
    }

    let rows = qb.build_query_as::<TransactionRow>().fetch_all(pool).await?;
    rows.into_iter().map(row_to_transaction).collect()
}

/// Write back the transfer flag of every transaction in `transactions`,
/// all or nothing. Returns the number of rows touched.
pub async fn save_transfer_flags(pool: &DbPool, transactions: &[Transaction]) -> Result<u64, StorageError> {
    let now = Utc::now().timestamp();
    let mut db_tx = pool.begin().await?;
    let mut touched = 0;

    for tx in transactions {
        let result = sqlx::query("UPDATE transactions SET is_bank_transfer = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(tx.is_bank_transfer))
            .bind(now)
            .bind(tx.id.to_string())
            .execute(&mut *db_tx)
            .await?;
        touched += result.rows_affected();
    }

    db_tx.commit().await?;
    tracing::debug!(rows = touched, "saved transfer flags");
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, day, 12, 0, 0).unwrap()
    }

    fn new_tx(external_id: &str, account_id: AccountId, cents: i64, desc: &str, occurred_at: DateTime<Utc>) -> NewTransaction {
        NewTransaction {
            external_id: external_id.to_string(),
            account_id,
            amount: Money::from_cents(cents),
            description: desc.to_string(),
            merchant_name: None,
            occurred_at,
        }
    }

    async fn seeded() -> (DbPool, Account, Account) {
        let pool = create_memory_db().await.unwrap();
        let a = upsert_account(&pool, &NewAccount::new("acc_a", "Everyday")).await.unwrap();
        let b = upsert_account(&pool, &NewAccount::new("acc_b", "Savings")).await.unwrap();
        upsert_transaction(&pool, &new_tx("t1", a.id, -10_000, "Transfer out", at(1))).await.unwrap();
        upsert_transaction(&pool, &new_tx("t2", b.id, 10_000, "Transfer in", at(3))).await.unwrap();
        upsert_transaction(&pool, &new_tx("t3", a.id, -4_000, "Card payment", at(5))).await.unwrap();
        upsert_transaction(&pool, &new_tx("t4", b.id, 8_000, "Salary part", at(7))).await.unwrap();
        (pool, a, b)
    }

    #[tokio::test]
    async fn upsert_account_keeps_local_id() {
        let pool = create_memory_db().await.unwrap();
        let first = upsert_account(&pool, &NewAccount::new("acc_1", "Everyday")).await.unwrap();
        let mut renamed = NewAccount::new("acc_1", "Everyday Plus");
        renamed.institution = Some("ASB".to_string());
        let second = upsert_account(&pool, &renamed).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Everyday Plus");
        assert_eq!(second.institution.as_deref(), Some("ASB"));
        assert_eq!(get_accounts(&pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_transaction_updates_in_place_and_keeps_flag() {
        let pool = create_memory_db().await.unwrap();
        let acct = upsert_account(&pool, &NewAccount::new("acc_1", "Everyday")).await.unwrap();

        let first = upsert_transaction(&pool, &new_tx("ext_1", acct.id, -500, "Coffee", at(2))).await.unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted(_)));

        let mut stored = get_transactions(&pool, &TransactionFilter::default()).await.unwrap();
        stored[0].is_bank_transfer = true;
        save_transfer_flags(&pool, &stored).await.unwrap();

        let second = upsert_transaction(&pool, &new_tx("ext_1", acct.id, 500, "Coffee refund", at(2))).await.unwrap();
        assert_eq!(second, UpsertOutcome::Updated(first.id()));

        let rows = get_transactions(&pool, &TransactionFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].amount, Money::from_cents(500));
        assert_eq!(rows[0].direction, Direction::In);
        assert_eq!(rows[0].description, "Coffee refund");
        assert!(rows[0].is_bank_transfer);
    }

    #[tokio::test]
    async fn get_transactions_orders_newest_first() {
        let (pool, _, _) = seeded().await;
        let rows = get_transactions(&pool, &TransactionFilter::default()).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|t| t.external_id.as_str()).collect();
        assert_eq!(ids, vec!["t4", "t3", "t2", "t1"]);
    }

    #[tokio::test]
    async fn filter_bounds_are_inclusive() {
        let (pool, _, _) = seeded().await;
        let rows = get_transactions(&pool, &TransactionFilter::between(at(3), at(5))).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|t| t.external_id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t2"]);

        let rows = get_transactions(&pool, &TransactionFilter::between(at(3) + Duration::seconds(1), at(5)))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn occurred_at_keeps_milliseconds() {
        let pool = create_memory_db().await.unwrap();
        let acct = upsert_account(&pool, &NewAccount::new("acc_1", "Everyday")).await.unwrap();
        let occurred_at = at(2) + Duration::milliseconds(500);
        upsert_transaction(&pool, &new_tx("ext_1", acct.id, -500, "Coffee", occurred_at)).await.unwrap();

        let rows = get_transactions(&pool, &TransactionFilter::default()).await.unwrap();
        assert_eq!(rows[0].occurred_at, occurred_at);

        // An upper bound half a second early must not round the row in.
        let rows = get_transactions(&pool, &TransactionFilter::between(at(1), at(2))).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn filter_by_account_and_direction() {
        let (pool, a, b) = seeded().await;

        let only_a = TransactionFilter {
            account_ids: vec![a.id],
            ..Default::default()
        };
        assert!(get_transactions(&pool, &only_a).await.unwrap().iter().all(|t| t.account_id == a.id));

        let not_a = TransactionFilter {
            excluded_account_ids: vec![a.id],
            ..Default::default()
        };
        assert!(get_transactions(&pool, &not_a).await.unwrap().iter().all(|t| t.account_id == b.id));

        let money_out = TransactionFilter {
            direction: Some(Direction::Out),
            ..Default::default()
        };
        let rows = get_transactions(&pool, &money_out).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|t| t.amount.is_negative()));
    }

    #[tokio::test]
    async fn only_unflagged_and_limit() {
        let (pool, _, _) = seeded().await;
        let mut rows = get_transactions(&pool, &TransactionFilter::default()).await.unwrap();
        for tx in rows.iter_mut().filter(|t| t.description.starts_with("Transfer")) {
            tx.is_bank_transfer = true;
        }
        assert_eq!(save_transfer_flags(&pool, &rows).await.unwrap(), 4);

        let unflagged = TransactionFilter {
            only_unflagged: true,
            ..Default::default()
        };
        let rows = get_transactions(&pool, &unflagged).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|t| !t.is_bank_transfer));

        let limited = TransactionFilter {
            limit: Some(1),
            ..Default::default()
        };
        let rows = get_transactions(&pool, &limited).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].external_id, "t4");
    }

    #[tokio::test]
    async fn on_disk_database_persists_between_pools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insights.db");

        {
            let pool = create_db(&path).await.unwrap();
            upsert_account(&pool, &NewAccount::new("acc_1", "Everyday")).await.unwrap();
            pool.close().await;
        }

        let pool = create_db(&path).await.unwrap();
        let accounts = get_accounts(&pool).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].external_id, "acc_1");
    }
}
