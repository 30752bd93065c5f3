pub mod db;

pub use db::{
    create_db, create_memory_db, get_accounts, get_transactions, save_transfer_flags,
    upsert_account, upsert_transaction, DbPool, StorageError, TransactionFilter, UpsertOutcome,
};
