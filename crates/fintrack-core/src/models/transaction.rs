use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{EntryKind, Money};

/// A single income or expense entry.
///
/// List responses omit the timestamps, so they are optional here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Transaction {
    pub id: i64,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub amount: Money,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub date: NaiveDate,
    pub merchant: String,
    /// Category id
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// Amount with the sign of its direction: expenses are negative
    pub fn signed_amount(&self) -> Money {
        match self.kind {
            EntryKind::Income => self.amount,
            EntryKind::Expense => Money::ZERO - self.amount,
        }
    }
}

/// Create/update body for a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTransaction {
    pub amount: Money,
    pub date: NaiveDate,
    pub merchant: String,
    pub category: Option<i64>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Query parameters accepted by the transaction list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntryKind>,
    /// Case-insensitive substring of the merchant name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    /// Free-text search over merchant and notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// `date`, `amount` or `created_at`, prefixed with `-` for descending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
}

/// Inclusive date bounds for the statistics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

/// Total and count for one category inside a statistics breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub total: Money,
    pub count: u64,
}

/// Aggregates over the user's transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStats {
    pub total_income: Money,
    pub total_expenses: Money,
    pub balance: Money,
    pub transaction_count: u64,
    /// `income`/`expense` -> category id -> total
    #[serde(default)]
    pub category_breakdown: BTreeMap<String, BTreeMap<String, CategoryTotal>>,
}

impl TransactionStats {
    pub fn breakdown(&self, kind: EntryKind) -> Option<&BTreeMap<String, CategoryTotal>> {
        self.category_breakdown.get(&kind.to_string())
    }
}

/// Daily income and expense totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub income: Money,
    pub expense: Money,
}

#[derive(Debug, Serialize)]
pub(crate) struct BulkDeleteRequest<'a> {
    pub ids: &'a [i64],
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageResponse {
    pub message: String,
}
