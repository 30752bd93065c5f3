use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::text::DEFAULT_TRANSFER_KEYWORDS;

/// Largest window any setting may ask for, about ten years.
pub const MAX_WINDOW_DAYS: i64 = 3650;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to parse transfer settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid transfer settings: {0}")]
    Invalid(String),
}

/// Tuning for the read-time matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSettings {
    /// Largest gap, inclusive, between the two halves of a transfer.
    pub window_days: i64,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self { window_days: 4 }
    }
}

impl MatcherSettings {
    pub fn window(&self) -> Duration {
        Duration::days(self.window_days)
    }
}

/// Tuning for the sync-time classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub window_days: i64,
    /// Pairs need token overlap strictly above this unless a keyword fires.
    pub similarity_threshold: f32,
    pub keywords: Vec<String>,
    /// Tokens shorter than this many characters are ignored.
    pub min_token_len: usize,
    /// Clear every flag before classifying. Off by default, so a flag set by
    /// an earlier run survives even when the transaction no longer qualifies.
    pub reset_flags: bool,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            window_days: 1,
            similarity_threshold: 0.45,
            keywords: DEFAULT_TRANSFER_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            min_token_len: 3,
            reset_flags: false,
        }
    }
}

impl ClassifierSettings {
    pub fn window(&self) -> Duration {
        Duration::days(self.window_days)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub matcher: MatcherSettings,
    pub classifier: ClassifierSettings,
}

impl TransferSettings {
    pub fn from_toml(toml_content: &str) -> Result<Self, SettingsError> {
        let settings: TransferSettings = toml::from_str(toml_content)?;
        settings.validated()
    }

    /// Checks ranges and lowercases keywords so matching can stay cheap.
    pub fn validated(mut self) -> Result<Self, SettingsError> {
        check_days("matcher.window_days", self.matcher.window_days)?;
        let classifier = &mut self.classifier;
        check_days("classifier.window_days", classifier.window_days)?;
        if !(0.0..=1.0).contains(&classifier.similarity_threshold) {
            return Err(SettingsError::Invalid(format!(
                "classifier.similarity_threshold must be within 0..=1, got {}",
                classifier.similarity_threshold
            )));
        }
        let mut keywords = Vec::with_capacity(classifier.keywords.len());
        for keyword in &classifier.keywords {
            let k = keyword.trim().to_lowercase();
            if k.is_empty() {
                return Err(SettingsError::Invalid("classifier.keywords must not contain blank entries".into()));
            }
            keywords.push(k);
        }
        classifier.keywords = keywords;
        Ok(self)
    }
}

/// Day counts must lie within `0..=MAX_WINDOW_DAYS`.
pub fn check_days(name: &str, days: i64) -> Result<(), SettingsError> {
    if !(0..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(SettingsError::Invalid(format!(
            "{name} must be within 0..={MAX_WINDOW_DAYS}, got {days}"
        )));
    }
    Ok(())
}
