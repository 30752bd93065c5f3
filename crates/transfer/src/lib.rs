//! Internal-transfer detection.
//!
//! Two detectors share one pairing rule (equal absolute amount, opposite
//! sign, different account, close in time):
//!
//! * [`TransferClassifier`] runs at sync time, adds keyword and
//!   description-similarity heuristics, and writes `is_bank_transfer`.
//! * [`TransferMatcher`] runs at read time over a padded candidate window
//!   and returns ids without touching stored state.

pub mod classifier;
pub mod matcher;
pub(crate) mod pairing;
pub mod settings;
pub mod text;

pub use classifier::{ClassificationSummary, TransferClassification, TransferClassifier};
pub use matcher::{TransferMatchCandidate, TransferMatcher, TransferMatching};
pub use settings::{check_days, ClassifierSettings, MatcherSettings, SettingsError, TransferSettings, MAX_WINDOW_DAYS};
