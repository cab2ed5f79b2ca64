//! Transactions, categories and budgets for the logged-in user.
//!
//! `FinanceService` pairs each `ApiClient` finance call with the stored
//! access token, renewing it once on a 401 the same way
//! `AuthService::profile` does.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::api::ApiClient;
use crate::auth::{AuthService, TokenStore};
use crate::config::StorageKeys;
use crate::models::{
    Budget, Category, CategoryChoice, DateRange, NewBudget, NewCategory, NewTransaction, Transaction,
    TransactionFilter, TransactionStats, TrendPoint,
};

pub struct FinanceService {
    session: AuthService,
}

impl FinanceService {
    pub fn new(client: ApiClient, store: Arc<dyn TokenStore>, keys: StorageKeys) -> Self {
        Self {
            session: AuthService::new(client, store, keys),
        }
    }

    fn client(&self) -> &ApiClient {
        self.session.client()
    }

    // ===== Transactions =====

    pub async fn transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        self.session
            .with_access(|token| async move { self.client().list_transactions(&token, filter).await })
            .await
    }

    pub async fn transaction(&self, id: i64) -> Result<Transaction> {
        self.session
            .with_access(|token| async move { self.client().get_transaction(&token, id).await })
            .await
    }

    pub async fn add_transaction(&self, transaction: &NewTransaction) -> Result<Transaction> {
        let created = self
            .session
            .with_access(|token| async move { self.client().create_transaction(&token, transaction).await })
            .await?;
        info!(id = created.id, kind = %created.kind, "Recorded transaction");
        Ok(created)
    }

    pub async fn update_transaction(&self, id: i64, transaction: &NewTransaction) -> Result<Transaction> {
        self.session
            .with_access(|token| async move { self.client().update_transaction(&token, id, transaction).await })
            .await
    }

    pub async fn delete_transaction(&self, id: i64) -> Result<()> {
        self.session
            .with_access(|token| async move { self.client().delete_transaction(&token, id).await })
            .await?;
        info!(id = id, "Deleted transaction");
        Ok(())
    }

    pub async fn delete_transactions(&self, ids: &[i64]) -> Result<String> {
        if ids.is_empty() {
            anyhow::bail!("No transaction ids given");
        }
        self.session
            .with_access(|token| async move { self.client().bulk_delete_transactions(&token, ids).await })
            .await
    }

    pub async fn stats(&self, range: &DateRange) -> Result<TransactionStats> {
        self.session
            .with_access(|token| async move { self.client().transaction_stats(&token, range).await })
            .await
    }

    pub async fn recent(&self) -> Result<Vec<Transaction>> {
        self.session
            .with_access(|token| async move { self.client().recent_transactions(&token).await })
            .await
    }

    pub async fn trends(&self) -> Result<Vec<TrendPoint>> {
        self.session
            .with_access(|token| async move { self.client().transaction_trends(&token).await })
            .await
    }

    pub async fn category_choices(&self) -> Result<Vec<CategoryChoice>> {
        self.session
            .with_access(|token| async move { self.client().transaction_categories(&token).await })
            .await
    }

    // ===== Categories =====

    pub async fn categories(&self) -> Result<Vec<Category>> {
        self.session
            .with_access(|token| async move { self.client().list_categories(&token).await })
            .await
    }

    pub async fn category(&self, id: i64) -> Result<Category> {
        self.session
            .with_access(|token| async move { self.client().get_category(&token, id).await })
            .await
    }

    pub async fn add_category(&self, category: &NewCategory) -> Result<Category> {
        self.session
            .with_access(|token| async move { self.client().create_category(&token, category).await })
            .await
    }

    pub async fn update_category(&self, id: i64, category: &NewCategory) -> Result<Category> {
        self.session
            .with_access(|token| async move { self.client().update_category(&token, id, category).await })
            .await
    }

    pub async fn delete_category(&self, id: i64) -> Result<()> {
        self.session
            .with_access(|token| async move { self.client().delete_category(&token, id).await })
            .await
    }

    // ===== Budgets =====

    pub async fn budgets(&self) -> Result<Vec<Budget>> {
        self.session
            .with_access(|token| async move { self.client().list_budgets(&token).await })
            .await
    }

    pub async fn budget(&self, id: i64) -> Result<Budget> {
        self.session
            .with_access(|token| async move { self.client().get_budget(&token, id).await })
            .await
    }

    pub async fn add_budget(&self, budget: &NewBudget) -> Result<Budget> {
        self.session
            .with_access(|token| async move { self.client().create_budget(&token, budget).await })
            .await
    }

    pub async fn update_budget(&self, id: i64, budget: &NewBudget) -> Result<Budget> {
        self.session
            .with_access(|token| async move { self.client().update_budget(&token, id, budget).await })
            .await
    }

    pub async fn delete_budget(&self, id: i64) -> Result<()> {
        self.session
            .with_access(|token| async move { self.client().delete_budget(&token, id).await })
            .await
    }

    pub async fn budget_summary(&self) -> Result<serde_json::Value> {
        self.session
            .with_access(|token| async move { self.client().budget_summary(&token).await })
            .await
    }
}
