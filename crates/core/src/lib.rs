pub mod account;
pub mod money;
pub mod period;
pub mod transaction;

pub use account::{Account, AccountId, NewAccount, DEFAULT_CURRENCY};
pub use money::Money;
pub use period::{DateRange, SyncRequest, SyncWindow, WindowError, DEFAULT_MONTHS_BACK};
pub use transaction::{Direction, NewTransaction, Transaction, TransactionId};
