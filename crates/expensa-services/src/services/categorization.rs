//! Keyword categorization with a time-bounded cache of the global category list.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use expensa_core::constants::FALLBACK_CATEGORY;
use expensa_core::models::Category;
use expensa_core::{AppError, Clock};
use expensa_db::CategoryStore;
use tokio::sync::RwLock;

struct Snapshot {
    categories: Arc<Vec<Category>>,
    fetched_at: DateTime<Utc>,
}

/// Caches the global category list for `ttl`. Every caller inside the window gets the same
/// `Arc`; the first caller after expiry re-reads the store. Concurrent misses may each
/// re-read.
pub struct CategoryCache {
    source: Arc<dyn CategoryStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl CategoryCache {
    pub fn new(source: Arc<dyn CategoryStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            snapshot: RwLock::new(None),
        }
    }

    pub async fn categories(&self) -> Result<Arc<Vec<Category>>, AppError> {
        let now = self.clock.now();
        {
            let guard = self.snapshot.read().await;
            if let Some(snapshot) = guard.as_ref() {
                if now - snapshot.fetched_at < self.ttl {
                    return Ok(snapshot.categories.clone());
                }
            }
        }

        let categories = Arc::new(self.source.list().await?);
        tracing::debug!(count = categories.len(), "Category cache refreshed");

        *self.snapshot.write().await = Some(Snapshot {
            categories: categories.clone(),
            fetched_at: now,
        });
        Ok(categories)
    }

    /// Drop the snapshot so the next call re-reads the store.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
    }

    /// Category for a merchant using the cached list.
    pub async fn resolve(&self, merchant_name: &str) -> Result<String, AppError> {
        let categories = self.categories().await?;
        Ok(resolve_category(merchant_name, &categories))
    }
}

/// First category (in listing order) with a keyword contained in the merchant name,
/// compared case-insensitively; `"Other"` when nothing matches.
pub fn resolve_category(merchant_name: &str, categories: &[Category]) -> String {
    let merchant = merchant_name.to_lowercase();
    categories
        .iter()
        .find(|category| {
            category.keywords.iter().any(|keyword| {
                let keyword = keyword.trim().to_lowercase();
                !keyword.is_empty() && merchant.contains(&keyword)
            })
        })
        .map(|category| category.name.clone())
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use expensa_core::ManualClock;
    use expensa_db::MemoryStore;
    use uuid::Uuid;

    fn category(name: &str, keywords: &[&str], sort_order: i32) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            sort_order,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn matches_keywords_case_insensitively() {
        let categories = vec![
            category("Food", &["starbucks", "kopi"], 10),
            category("Groceries", &["indomaret", "mart"], 20),
        ];
        assert_eq!(resolve_category("STARBUCKS Grand Indonesia", &categories), "Food");
        assert_eq!(resolve_category("Indomaret Point", &categories), "Groceries");
        assert_eq!(resolve_category("Apotek K-24", &categories), "Other");
    }

    #[test]
    fn first_match_in_listing_order_wins() {
        let categories = vec![
            category("Groceries", &["mart"], 10),
            category("Food", &["kopi"], 20),
        ];
        assert_eq!(resolve_category("Kopi Mart", &categories), "Groceries");
    }

    #[tokio::test]
    async fn cache_serves_same_snapshot_within_ttl() {
        let store = MemoryStore::with_default_categories();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
        let cache = CategoryCache::new(
            Arc::new(store.clone()),
            clock.clone(),
            Duration::from_secs(300),
        );

        let first = cache.categories().await.unwrap();
        clock.advance(chrono::Duration::seconds(299));
        let second = cache.categories().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            serde_json::to_vec(&*first).unwrap(),
            serde_json::to_vec(&*second).unwrap()
        );
        assert_eq!(store.category_reads(), 1);
    }

    #[tokio::test]
    async fn cache_refetches_after_expiry_and_invalidate() {
        let store = MemoryStore::with_default_categories();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()));
        let cache = CategoryCache::new(
            Arc::new(store.clone()),
            clock.clone(),
            Duration::from_secs(300),
        );

        cache.categories().await.unwrap();
        clock.advance(chrono::Duration::seconds(300));
        cache.categories().await.unwrap();
        assert_eq!(store.category_reads(), 2);

        cache.invalidate().await;
        cache.categories().await.unwrap();
        assert_eq!(store.category_reads(), 3);
    }

    #[tokio::test]
    async fn resolve_uses_seeded_keywords() {
        let store = MemoryStore::with_default_categories();
        let cache = CategoryCache::new(
            Arc::new(store),
            Arc::new(expensa_core::SystemClock),
            Duration::from_secs(300),
        );
        assert_eq!(cache.resolve("Indomaret Kemang").await.unwrap(), "Groceries");
        assert_eq!(cache.resolve("Starbucks Senayan").await.unwrap(), "Food");
        assert_eq!(cache.resolve("Toko Budi").await.unwrap(), "Other");
    }
}
