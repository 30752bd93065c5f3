use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use insights_core::{DateRange, Money, NewAccount};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(String),
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("No data rows")]
    NoDataRows,
    #[error("Unknown account: {0}")]
    UnknownAccount(String),
}

/// A transaction as reported upstream, before it is tied to a local account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceTransaction {
    pub external_id: String,
    pub account_external_id: String,
    pub amount: Money,
    pub description: String,
    pub merchant_name: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Where sync pulls accounts and transactions from.
pub trait TransactionSource {
    fn accounts(&self) -> Result<Vec<NewAccount>, SourceError>;

    /// Transactions of one account whose date falls inside `window`.
    fn transactions(&self, account_external_id: &str, window: DateRange) -> Result<Vec<SourceTransaction>, SourceError>;
}

// ── CSV statements ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvColumnMapping {
    pub date_column: Option<usize>,
    pub description_column: Option<usize>,
    /// Signed amount, negative for money out.
    pub amount_column: Option<usize>,
    /// Money out, written as a positive number.
    pub debit_column: Option<usize>,
    /// Money in, written as a positive number.
    pub credit_column: Option<usize>,
    pub merchant_column: Option<usize>,
    pub date_format: String,
}

impl Default for CsvColumnMapping {
    fn default() -> Self {
        Self {
            date_column: Some(0),
            description_column: Some(1),
            amount_column: Some(2),
            debit_column: None,
            credit_column: None,
            merchant_column: None,
            date_format: "%Y-%m-%d".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvImportProfile {
    pub name: String,
    pub mapping: CsvColumnMapping,
    pub has_header: bool,
    pub delimiter: String,
}

impl Default for CsvImportProfile {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            mapping: CsvColumnMapping::default(),
            has_header: true,
            delimiter: ",".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CsvRow {
    date: NaiveDate,
    description: String,
    amount: Money,
    merchant_name: Option<String>,
}

/// A single account's bank statement exported as CSV.
///
/// Rows carry no provider id, so each gets a fingerprint of account, date,
/// description, amount and its occurrence among identical rows. Re-importing
/// an overlapping statement therefore updates rather than duplicates.
#[derive(Debug, Clone)]
pub struct CsvStatementSource {
    account: NewAccount,
    rows: Vec<CsvRow>,
}

impl CsvStatementSource {
    pub fn from_reader<R: Read>(account: NewAccount, data: R, profile: &CsvImportProfile) -> Result<Self, SourceError> {
        let delimiter = profile.delimiter.as_bytes().first().copied().unwrap_or(b',');
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(profile.has_header)
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(data);

        let rows = parse_rows(&mut reader, &profile.mapping)?;
        Ok(Self { account, rows })
    }
}

impl TransactionSource for CsvStatementSource {
    fn accounts(&self) -> Result<Vec<NewAccount>, SourceError> {
        Ok(vec![self.account.clone()])
    }

    fn transactions(&self, account_external_id: &str, window: DateRange) -> Result<Vec<SourceTransaction>, SourceError> {
        if account_external_id != self.account.external_id {
            return Err(SourceError::UnknownAccount(account_external_id.to_string()));
        }

        let mut seen: HashMap<String, u32> = HashMap::new();
        let mut out = Vec::new();
        for row in &self.rows {
            // Occurrence counts run over the whole file so ids stay stable
            // whatever window is requested.
            let base = row_fingerprint(account_external_id, row);
            let occurrence = seen.entry(base.clone()).or_insert(0);
            *occurrence += 1;

            if !window.contains(row.date) {
                continue;
            }
            out.push(SourceTransaction {
                external_id: format!("csv_{}", to_hex(&sha256(&format!("{base}|{occurrence}")))),
                account_external_id: account_external_id.to_string(),
                amount: row.amount,
                description: row.description.clone(),
                merchant_name: row.merchant_name.clone(),
                occurred_at: Utc.from_utc_datetime(&row.date.and_time(NaiveTime::MIN)),
            });
        }
        Ok(out)
    }
}

fn row_fingerprint(account_external_id: &str, row: &CsvRow) -> String {
    format!("{account_external_id}|{}|{}|{}", row.date, row.description, row.amount.as_decimal())
}

fn sha256(s: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hasher.finalize().into()
}

fn to_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_rows<R: Read>(reader: &mut csv::Reader<R>, mapping: &CsvColumnMapping) -> Result<Vec<CsvRow>, SourceError> {
    let mut rows = Vec::new();
    let date_col = mapping
        .date_column
        .ok_or_else(|| SourceError::MissingColumn("date_column".to_string()))?;

    for (line, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let field = record
            .get(date_col)
            .ok_or_else(|| SourceError::MissingColumn(format!("date_column {date_col}")))?;
        let date = parse_date(field, &mapping.date_format)?;

        let description = mapping
            .description_column
            .and_then(|col| record.get(col))
            .unwrap_or_default()
            .trim()
            .to_string();

        let amount = if let Some(col) = mapping.amount_column {
            parse_amount(record.get(col).unwrap_or_default())?
        } else if let (Some(d_col), Some(c_col)) = (mapping.debit_column, mapping.credit_column) {
            let debit = optional_amount(record.get(d_col))?;
            let credit = optional_amount(record.get(c_col))?;
            match (debit, credit) {
                (Some(d), None) => -d.abs(),
                (None, Some(c)) => c.abs(),
                (Some(d), Some(c)) => c.abs() - d.abs(),
                (None, None) => {
                    tracing::warn!(line = line + 1, "row has neither debit nor credit, skipping");
                    continue;
                }
            }
        } else {
            return Err(SourceError::MissingColumn("amount_column or debit_column + credit_column".to_string()));
        };

        let merchant_name = mapping
            .merchant_column
            .and_then(|col| record.get(col))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        rows.push(CsvRow {
            date,
            description,
            amount,
            merchant_name,
        });
    }

    if rows.is_empty() {
        return Err(SourceError::NoDataRows);
    }
    Ok(rows)
}

fn optional_amount(field: Option<&str>) -> Result<Option<Money>, SourceError> {
    field.filter(|s| !s.trim().is_empty()).map(parse_amount).transpose()
}

fn parse_date(s: &str, format: &str) -> Result<NaiveDate, SourceError> {
    let s = s.trim();

    if let Ok(date) = NaiveDate::parse_from_str(s, format) {
        return Ok(date);
    }

    for fmt in &["%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%Y-%m-%d", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(SourceError::InvalidDate(s.to_string()))
}

fn parse_amount(s: &str) -> Result<Money, SourceError> {
    let s = s.trim();
    let (negative, s) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let s = s.replace([',', '$', ' '], "");
    let mut dec = Decimal::from_str(&s).map_err(|_| SourceError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Ok(Money::from_decimal(dec))
}
