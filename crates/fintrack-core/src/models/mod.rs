//! Data models for the FinTrack backend.
//!
//! These types mirror the JSON shapes returned by the backend's account,
//! transaction, category and budget endpoints.

pub mod budget;
pub mod category;
pub mod money;
pub mod transaction;
pub mod user;

pub use budget::{Budget, BudgetPeriod, NewBudget};
pub use category::{Category, CategoryChoice, EntryKind, NewCategory};
pub use money::{Money, ParseMoneyError};
pub use transaction::{
    CategoryTotal, DateRange, NewTransaction, Transaction, TransactionFilter, TransactionStats, TrendPoint,
};
pub use user::{LoginUser, NewUser, TokenPair, UserProfile};
