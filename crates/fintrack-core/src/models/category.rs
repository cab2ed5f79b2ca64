use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether money comes in or goes out. Shared by categories and transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    #[default]
    Expense,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            EntryKind::Income => "income",
            EntryKind::Expense => "expense",
        })
    }
}

/// Icon the backend assigns when none is given
pub const DEFAULT_CATEGORY_ICON: &str = "📁";

fn default_icon() -> String {
    DEFAULT_CATEGORY_ICON.to_string()
}

/// A user-defined category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Category {
    /// "📁 Groceries"
    pub fn label(&self) -> String {
        format!("{} {}", self.icon, self.name)
    }
}

/// Create/update body for a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// One of the fixed category choices offered for transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryChoice {
    pub value: String,
    pub label: String,
}
