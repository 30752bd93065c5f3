use chrono::{DateTime, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Upper bound on an explicit sync range, roughly 24 months.
pub const MAX_SYNC_DAYS: i64 = 730;
pub const DEFAULT_MONTHS_BACK: u32 = 6;
pub const MAX_MONTHS_BACK: u32 = 24;

/// Inclusive calendar-date range, interpreted in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// First and last second covered by the range.
    pub fn bounds(self) -> (DateTime<Utc>, DateTime<Utc>) {
        self.padded_bounds(Duration::zero())
    }

    /// Bounds widened by `pad` on both sides, so that pairs straddling the
    /// visible range can still be seen.
    pub fn padded_bounds(self, pad: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
        let from = start_of_day(self.start) - pad;
        let to = start_of_day(self.end) + Duration::days(1) - Duration::seconds(1) + pad;
        (from, to)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("Both fromDate and toDate must be supplied together.")]
    PartialRange,
    #[error("fromDate cannot be after toDate.")]
    Inverted,
    #[error("The maximum sync range is 24 months.")]
    TooLong,
    #[error("monthsBack must be between 1 and 24.")]
    MonthsBackOutOfRange,
}

/// What the caller asked to sync: an explicit date pair or a look-back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub months_back: Option<u32>,
}

impl SyncRequest {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        SyncRequest {
            from_date: Some(from),
            to_date: Some(to),
            months_back: None,
        }
    }

    pub fn months_back(months: u32) -> Self {
        SyncRequest {
            months_back: Some(months),
            ..Default::default()
        }
    }

    /// Resolve into a concrete window ending `today` when no explicit dates
    /// were given. Explicit dates win over `months_back`.
    pub fn resolve(&self, today: NaiveDate, default_months_back: u32) -> Result<SyncWindow, WindowError> {
        if self.from_date.is_some() || self.to_date.is_some() {
            let (Some(from), Some(to)) = (self.from_date, self.to_date) else {
                return Err(WindowError::PartialRange);
            };
            if from > to {
                return Err(WindowError::Inverted);
            }
            if (to - from).num_days() > MAX_SYNC_DAYS {
                return Err(WindowError::TooLong);
            }
            return Ok(SyncWindow(DateRange::new(from, to)));
        }

        let months = self.months_back.unwrap_or(default_months_back);
        if !(1..=MAX_MONTHS_BACK).contains(&months) {
            return Err(WindowError::MonthsBackOutOfRange);
        }
        let from = today
            .checked_sub_months(Months::new(months))
            .ok_or(WindowError::MonthsBackOutOfRange)?;
        Ok(SyncWindow(DateRange::new(from, today)))
    }
}

/// A validated sync window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow(pub DateRange);

impl SyncWindow {
    pub fn range(self) -> DateRange {
        self.0
    }
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
