//! Transaction, category and budget endpoints.
//!
//! Every call takes the access token explicitly; renewing it on a 401 is the
//! caller's job (see `FinanceService`).

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{ApiClient, ApiError};
use crate::models::transaction::{BulkDeleteRequest, MessageResponse};
use crate::models::{
    Budget, Category, CategoryChoice, DateRange, NewBudget, NewCategory, NewTransaction, Transaction,
    TransactionFilter, TransactionStats, TrendPoint,
};

/// Collection body: a bare array, or a page if pagination is switched on.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Plain(Vec<T>),
    Page { results: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListBody::Plain(items) | ListBody::Page { results: items } => items,
        }
    }
}

impl ApiClient {
    async fn get_list<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<Vec<T>, ApiError> {
        let body: ListBody<T> = self.get(url, token).await?;
        Ok(body.into_vec())
    }

    // ===== Transactions =====

    pub async fn list_transactions(
        &self,
        access_token: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, ApiError> {
        let url = self.url(&self.endpoints.transactions);
        let body: ListBody<Transaction> = self.get_with_query(&url, access_token, filter).await?;
        Ok(body.into_vec())
    }

    pub async fn get_transaction(&self, access_token: &str, id: i64) -> Result<Transaction, ApiError> {
        let url = self.member_url(&self.endpoints.transactions, id);
        self.get(&url, access_token).await
    }

    pub async fn create_transaction(
        &self,
        access_token: &str,
        transaction: &NewTransaction,
    ) -> Result<Transaction, ApiError> {
        let url = self.url(&self.endpoints.transactions);
        let created: Transaction = self.send_json(Method::POST, &url, access_token, transaction).await?;
        debug!(id = created.id, amount = %created.amount, "Created transaction");
        Ok(created)
    }

    pub async fn update_transaction(
        &self,
        access_token: &str,
        id: i64,
        transaction: &NewTransaction,
    ) -> Result<Transaction, ApiError> {
        let url = self.member_url(&self.endpoints.transactions, id);
        self.send_json(Method::PUT, &url, access_token, transaction).await
    }

    pub async fn delete_transaction(&self, access_token: &str, id: i64) -> Result<(), ApiError> {
        let url = self.member_url(&self.endpoints.transactions, id);
        self.delete(&url, access_token).await
    }

    /// Delete several transactions at once; returns the backend's summary message
    pub async fn bulk_delete_transactions(&self, access_token: &str, ids: &[i64]) -> Result<String, ApiError> {
        let url = self.member_url(&self.endpoints.transactions, "bulk_delete");
        let response: MessageResponse = self
            .send_json(Method::DELETE, &url, access_token, &BulkDeleteRequest { ids })
            .await?;
        Ok(response.message)
    }

    pub async fn transaction_stats(&self, access_token: &str, range: &DateRange) -> Result<TransactionStats, ApiError> {
        let url = self.member_url(&self.endpoints.transactions, "stats");
        self.get_with_query(&url, access_token, range).await
    }

    /// The ten most recent transactions
    pub async fn recent_transactions(&self, access_token: &str) -> Result<Vec<Transaction>, ApiError> {
        let url = self.member_url(&self.endpoints.transactions, "recent");
        self.get_list(&url, access_token).await
    }

    /// Daily income/expense totals, oldest first
    pub async fn transaction_trends(&self, access_token: &str) -> Result<Vec<TrendPoint>, ApiError> {
        let url = self.member_url(&self.endpoints.transactions, "trends");
        self.get_list(&url, access_token).await
    }

    /// Fixed category choices offered by the transaction form
    pub async fn transaction_categories(&self, access_token: &str) -> Result<Vec<CategoryChoice>, ApiError> {
        let url = self.member_url(&self.endpoints.transactions, "categories");
        self.get_list(&url, access_token).await
    }

    // ===== Categories =====

    pub async fn list_categories(&self, access_token: &str) -> Result<Vec<Category>, ApiError> {
        let url = self.url(&self.endpoints.categories);
        self.get_list(&url, access_token).await
    }

    pub async fn get_category(&self, access_token: &str, id: i64) -> Result<Category, ApiError> {
        let url = self.member_url(&self.endpoints.categories, id);
        self.get(&url, access_token).await
    }

    pub async fn create_category(&self, access_token: &str, category: &NewCategory) -> Result<Category, ApiError> {
        let url = self.url(&self.endpoints.categories);
        self.send_json(Method::POST, &url, access_token, category).await
    }

    pub async fn update_category(
        &self,
        access_token: &str,
        id: i64,
        category: &NewCategory,
    ) -> Result<Category, ApiError> {
        let url = self.member_url(&self.endpoints.categories, id);
        self.send_json(Method::PUT, &url, access_token, category).await
    }

    pub async fn delete_category(&self, access_token: &str, id: i64) -> Result<(), ApiError> {
        let url = self.member_url(&self.endpoints.categories, id);
        self.delete(&url, access_token).await
    }

    // ===== Budgets =====

    pub async fn list_budgets(&self, access_token: &str) -> Result<Vec<Budget>, ApiError> {
        let url = self.url(&self.endpoints.budgets);
        self.get_list(&url, access_token).await
    }

    pub async fn get_budget(&self, access_token: &str, id: i64) -> Result<Budget, ApiError> {
        let url = self.member_url(&self.endpoints.budgets, id);
        self.get(&url, access_token).await
    }

    pub async fn create_budget(&self, access_token: &str, budget: &NewBudget) -> Result<Budget, ApiError> {
        let url = self.url(&self.endpoints.budgets);
        self.send_json(Method::POST, &url, access_token, budget).await
    }

    pub async fn update_budget(&self, access_token: &str, id: i64, budget: &NewBudget) -> Result<Budget, ApiError> {
        let url = self.member_url(&self.endpoints.budgets, id);
        self.send_json(Method::PUT, &url, access_token, budget).await
    }

    pub async fn delete_budget(&self, access_token: &str, id: i64) -> Result<(), ApiError> {
        let url = self.member_url(&self.endpoints.budgets, id);
        self.delete(&url, access_token).await
    }

    /// Budget summary as the backend reports it; the shape is not fixed.
    pub async fn budget_summary(&self, access_token: &str) -> Result<serde_json::Value, ApiError> {
        let url = self.member_url(&self.endpoints.budgets, "summary");
        self.get(&url, access_token).await
    }
}
