use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, Money};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

/// A spending limit for one category over a date range.
///
/// The list endpoint leaves out `category`, the spend figures and the
/// timestamps; detail responses carry all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Budget {
    pub id: i64,
    #[serde(default)]
    pub category: Option<i64>,
    #[serde(default)]
    pub category_detail: Option<Category>,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub amount: Money,
    #[serde(default)]
    pub period: BudgetPeriod,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub start_date: NaiveDate,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub end_date: NaiveDate,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub spent_amount: Option<Money>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub remaining_amount: Option<Money>,
    #[serde(default)]
    pub percentage_used: Option<f64>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Budget {
    /// Category id, from either the id field or the embedded category
    pub fn category_id(&self) -> Option<i64> {
        self.category.or_else(|| self.category_detail.as_ref().map(|c| c.id))
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn is_over(&self) -> bool {
        match (self.spent_amount, self.percentage_used) {
            (Some(spent), _) => spent > self.amount,
            (None, Some(pct)) => pct > 100.0,
            (None, None) => false,
        }
    }
}

/// Create/update body for a budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBudget {
    pub category: i64,
    pub amount: Money,
    pub period: BudgetPeriod,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
