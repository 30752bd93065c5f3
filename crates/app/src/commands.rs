use anyhow::{Context, Result};
use chrono::Utc;
use insights_core::{DateRange, NewAccount, SyncRequest, DEFAULT_CURRENCY};
use insights_storage::{create_db, DbPool};
use insights_transfer::{TransferClassifier, TransferMatcher};
use serde::Serialize;
use std::fs::File;
use std::path::Path;

use crate::analytics::{monthly_cashflow, CashflowQuery};
use crate::cli::{CashflowArgs, Cli, Command, FeedArgs, ImportArgs, ReclassifyArgs};
use crate::config::AppConfig;
use crate::feed::{transaction_feed, FeedQuery, DEFAULT_FEED_LIMIT};
use crate::source::CsvStatementSource;
use crate::sync::SyncService;

pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let db_path = match cli.database {
        Some(path) => path,
        None => config.database_path()?,
    };
    let pool = open_db(&db_path).await?;

    match cli.command {
        Command::Import(args) => import(&pool, &config, args).await,
        Command::Feed(args) => feed(&pool, &config, args).await,
        Command::Cashflow(args) => cashflow(&pool, &config, args).await,
        Command::Reclassify(args) => reclassify(&pool, &config, args).await,
    }
}

async fn open_db(path: &Path) -> Result<DbPool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    create_db(path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn import(pool: &DbPool, config: &AppConfig, args: ImportArgs) -> Result<()> {
    let account = NewAccount {
        external_id: args.account,
        name: args.name,
        institution: args.institution,
        currency: args.currency.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
    };
    let file = File::open(&args.file).with_context(|| format!("Failed to open {}", args.file.display()))?;
    let source = CsvStatementSource::from_reader(account, file, &config.csv)
        .with_context(|| format!("Failed to read statement {}", args.file.display()))?;

    let request = SyncRequest {
        from_date: args.range.from,
        to_date: args.range.to,
        months_back: args.months_back,
    };
    let service = SyncService::new(
        pool.clone(),
        TransferClassifier::new(config.transfer.classifier.clone()),
        config.sync.clone(),
    );
    let report = service.sync(&source, &request, Utc::now().date_naive()).await?;
    print_json(&report)
}

async fn feed(pool: &DbPool, config: &AppConfig, args: FeedArgs) -> Result<()> {
    let query = FeedQuery {
        range: args.range.range(),
        account_ids: args.accounts,
        direction: args.direction.direction(),
        include_transfers: !args.exclude_transfers,
        read_time_matching: args.read_time,
        limit: args.limit.unwrap_or(DEFAULT_FEED_LIMIT),
    };
    let matcher = TransferMatcher::new(&config.transfer.matcher);
    let items = transaction_feed(pool, &matcher, &query).await?;
    print_json(&items)
}

async fn cashflow(pool: &DbPool, config: &AppConfig, args: CashflowArgs) -> Result<()> {
    let query = CashflowQuery {
        range: args.range.range(),
        account_ids: args.accounts,
        excluded_account_ids: args.excluded_accounts,
        exclude_transfers: args.exclude_transfers,
        read_time_matching: args.read_time,
    };
    let matcher = TransferMatcher::new(&config.transfer.matcher);
    let report = monthly_cashflow(pool, &matcher, &query).await?;
    print_json(&report)
}

async fn reclassify(pool: &DbPool, config: &AppConfig, args: ReclassifyArgs) -> Result<()> {
    if args.from > args.to {
        anyhow::bail!("--from cannot be after --to");
    }
    let service = SyncService::new(
        pool.clone(),
        TransferClassifier::new(config.transfer.classifier.clone()),
        config.sync.clone(),
    );
    let summary = service.reclassify(DateRange::new(args.from, args.to)).await?;
    print_json(&summary)
}
