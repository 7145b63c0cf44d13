//! Cleanup of stored receipt images once their expenses are gone.
//!
//! Storage failures here never fail the request that removed the expense; they are logged
//! and the file is left behind.

use std::collections::BTreeSet;
use std::sync::Arc;

use expensa_core::models::{Expense, ExpenseFilter, ExpenseOrder};
use expensa_db::ExpenseStore;
use expensa_storage::keys::key_belongs_to;
use expensa_storage::Storage;
use uuid::Uuid;

pub struct ReceiptFiles {
    storage: Arc<dyn Storage>,
    expenses: Arc<dyn ExpenseStore>,
}

impl ReceiptFiles {
    pub fn new(storage: Arc<dyn Storage>, expenses: Arc<dyn ExpenseStore>) -> Self {
        Self { storage, expenses }
    }

    /// Storage key behind an expense's image, when this deployment stored it.
    fn owned_key(&self, organization_id: Uuid, image_url: Option<&str>) -> Option<String> {
        let key = self.storage.key_for_url(image_url?)?;
        key_belongs_to(organization_id, &key).then_some(key)
    }

    async fn delete_key(&self, key: &str) {
        match self.storage.delete(key).await {
            Ok(()) => tracing::debug!(key = %key, "Receipt file deleted"),
            Err(e) => tracing::warn!(error = %e, key = %key, "Failed to delete receipt file"),
        }
    }

    /// Delete the receipt of an expense that was just removed, unless another expense in
    /// the organization still points at the same file.
    pub async fn release(&self, expense: &Expense) {
        let Some(key) = self.owned_key(expense.organization_id, expense.image_url.as_deref())
        else {
            return;
        };

        let filter = ExpenseFilter::for_organization(expense.organization_id);
        match self.expenses.list(&filter, ExpenseOrder::NewestFirst).await {
            Ok(remaining) => {
                if remaining
                    .iter()
                    .any(|e| e.id != expense.id && e.image_url == expense.image_url)
                {
                    tracing::debug!(key = %key, "Receipt file still referenced");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Skipping receipt cleanup");
                return;
            }
        }

        self.delete_key(&key).await;
    }

    /// Delete every receipt referenced by the expenses of a deleted organization.
    pub async fn release_all(&self, organization_id: Uuid, expenses: &[Expense]) {
        let keys: BTreeSet<String> = expenses
            .iter()
            .filter_map(|e| self.owned_key(organization_id, e.image_url.as_deref()))
            .collect();
        for key in &keys {
            self.delete_key(key).await;
        }
        if !keys.is_empty() {
            tracing::info!(organization_id = %organization_id, files = keys.len(), "Receipt files released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::intake::ReceiptUpload;
    use crate::services::test_support::Fixture;
    use bytes::Bytes;
    use expensa_core::models::{ExtractRequest, Role};

    async fn upload(fx: &Fixture) -> String {
        let receipt = ReceiptUpload {
            content_type: "image/jpeg".to_string(),
            data: Bytes::from_static(b"\xFF\xD8\xFFreceipt"),
        };
        fx.intake.upload(&fx.owner, fx.org, receipt).await.unwrap().path
    }

    async fn extract(fx: &Fixture, path: &str) -> Expense {
        fx.intake
            .extract(
                &fx.owner,
                ExtractRequest {
                    organization_id: fx.org,
                    image_url: None,
                    path: Some(path.to_string()),
                },
            )
            .await
            .unwrap()
            .expense
    }

    #[tokio::test]
    async fn reject_removes_stored_receipt() {
        let fx = Fixture::new().await;
        let path = upload(&fx).await;
        let expense = extract(&fx, &path).await;

        fx.approvals.reject(&fx.owner, expense.id, Some("duplicate")).await.unwrap();
        assert!(!fx.storage.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn member_delete_removes_stored_receipt() {
        let fx = Fixture::new().await;
        let member = fx.join_as(Role::Member).await;
        let path = upload(&fx).await;
        let expense = fx
            .intake
            .extract(
                &member,
                ExtractRequest {
                    organization_id: fx.org,
                    image_url: None,
                    path: Some(path.clone()),
                },
            )
            .await
            .unwrap()
            .expense;

        fx.expenses.delete(&member, expense.id).await.unwrap();
        assert!(!fx.storage.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn shared_receipt_kept_until_last_expense_goes() {
        let fx = Fixture::new().await;
        let path = upload(&fx).await;
        let first = extract(&fx, &path).await;
        let second = extract(&fx, &path).await;

        fx.expenses.delete(&fx.owner, first.id).await.unwrap();
        assert!(fx.storage.exists(&path).await.unwrap());

        fx.approvals.reject(&fx.owner, second.id, None).await.unwrap();
        assert!(!fx.storage.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn organization_delete_removes_receipts() {
        let fx = Fixture::new().await;
        let kept = upload(&fx).await;
        let reviewed = upload(&fx).await;
        extract(&fx, &kept).await;
        let verified = extract(&fx, &reviewed).await;
        fx.approvals.approve(&fx.owner, verified.id).await.unwrap();

        fx.organizations.delete(&fx.owner, fx.org).await.unwrap();
        assert!(!fx.storage.exists(&kept).await.unwrap());
        assert!(!fx.storage.exists(&reviewed).await.unwrap());
    }

    #[tokio::test]
    async fn foreign_image_urls_are_ignored() {
        let fx = Fixture::new().await;
        let path = upload(&fx).await;
        let files = ReceiptFiles::new(fx.storage.clone(), Arc::new(fx.store.clone()));
        let other_org = Uuid::new_v4();

        let mut expense = extract(&fx, &path).await;
        expense.organization_id = other_org;
        files.release(&expense).await;
        assert!(fx.storage.exists(&path).await.unwrap());

        expense.organization_id = fx.org;
        expense.image_url = Some("https://cdn.example.com/receipt.jpg".to_string());
        files.release(&expense).await;
        assert!(fx.storage.exists(&path).await.unwrap());
    }
}
