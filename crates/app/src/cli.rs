use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use insights_core::{AccountId, DateRange, Direction};
use std::path::PathBuf;

/// Personal banking insights over a local SQLite ledger
#[derive(Parser, Debug)]
#[command(name = "insights", version)]
#[command(about = "Import bank statements and report on spending without internal transfers", long_about = None)]
pub struct Cli {
    /// Config file, instead of insights.toml in the user config directory
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configured one
    #[arg(long, global = true, value_name = "FILE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sync a CSV bank statement into the ledger and refresh transfer flags
    Import(ImportArgs),
    /// List transactions, newest first
    Feed(FeedArgs),
    /// Monthly money in and out
    Cashflow(CashflowArgs),
    /// Rerun the transfer classifier over stored transactions
    Reclassify(ReclassifyArgs),
}

/// Inclusive date range given as a pair of flags.
#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    #[arg(long, value_name = "YYYY-MM-DD", requires = "to")]
    pub from: Option<NaiveDate>,

    #[arg(long, value_name = "YYYY-MM-DD", requires = "from")]
    pub to: Option<NaiveDate>,
}

impl RangeArgs {
    pub fn range(&self) -> Option<DateRange> {
        match (self.from, self.to) {
            (Some(from), Some(to)) => Some(DateRange::new(from, to)),
            _ => None,
        }
    }
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// CSV statement to import
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Account identifier as the bank knows it
    #[arg(long = "account", value_name = "EXTERNAL_ID")]
    pub account: String,

    /// Display name for the account
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub institution: Option<String>,

    #[arg(long)]
    pub currency: Option<String>,

    #[command(flatten)]
    pub range: RangeArgs,

    /// Look back this many months from today (1-24)
    #[arg(long, value_name = "MONTHS", conflicts_with_all = ["from", "to"])]
    pub months_back: Option<u32>,
}

#[derive(Args, Debug)]
pub struct FeedArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    /// Only these accounts (local ids), repeatable
    #[arg(long = "account", value_name = "ID")]
    pub accounts: Vec<AccountId>,

    #[arg(long, value_enum, default_value = "all")]
    pub direction: DirectionArg,

    #[arg(long)]
    pub exclude_transfers: bool,

    /// Recompute transfers instead of using stored flags
    #[arg(long)]
    pub read_time: bool,

    #[arg(long, value_name = "N")]
    pub limit: Option<u32>,
}

#[derive(Args, Debug)]
pub struct CashflowArgs {
    #[command(flatten)]
    pub range: RangeArgs,

    #[arg(long = "account", value_name = "ID")]
    pub accounts: Vec<AccountId>,

    #[arg(long = "exclude-account", value_name = "ID")]
    pub excluded_accounts: Vec<AccountId>,

    #[arg(long)]
    pub exclude_transfers: bool,

    #[arg(long)]
    pub read_time: bool,
}

#[derive(Args, Debug)]
pub struct ReclassifyArgs {
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub from: NaiveDate,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub to: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    In,
    Out,
    All,
}

impl DirectionArg {
    pub fn direction(self) -> Option<Direction> {
        match self {
            DirectionArg::In => Some(Direction::In),
            DirectionArg::Out => Some(Direction::Out),
            DirectionArg::All => None,
        }
    }
}
