pub mod analytics;
pub mod cli;
pub mod commands;
pub mod config;
pub mod feed;
pub mod read_time;
pub mod source;
pub mod sync;

#[cfg(test)]
mod fixtures;

pub use analytics::{monthly_cashflow, CashflowQuery, CashflowReport, CashflowRow, CashflowSummary};
pub use config::{AppConfig, ConfigError, SyncSettings};
pub use feed::{transaction_feed, FeedItem, FeedQuery};
pub use read_time::matched_transfer_ids;
pub use source::{CsvImportProfile, CsvStatementSource, SourceError, SourceTransaction, TransactionSource};
pub use sync::{SyncError, SyncReport, SyncService};
