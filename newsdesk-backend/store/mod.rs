pub mod error;
pub mod file_kv;
pub mod kv;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::article::prepend_capped;
use crate::models::cron_log::MAX_CRON_LOGS;
use crate::models::{Article, CronLog, SiteConfig, Stats};

pub use error::StoreError;
pub use kv::{KvStore, MemoryKvStore, get_json, put_json};

pub const ARTICLES_KEY: &str = "articles";
pub const STATS_KEY: &str = "stats";
pub const CONFIG_KEY: &str = "config";
pub const CRON_LOGS_KEY: &str = "cron_logs";
pub const INITIALIZED_KEY: &str = "initialized";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitMarker {
    pub at: DateTime<Utc>,
    pub version: String,
}

/// Typed access to the well-known blobs. Read-modify-write goes through a
/// single write lock so updates inside this process never interleave.
pub struct SiteStore {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl SiteStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    pub fn kv(&self) -> &dyn KvStore {
        self.kv.as_ref()
    }

    async fn read_or_default<T: DeserializeOwned + Default>(
        &self,
        key: &str,
    ) -> Result<T, StoreError> {
        Ok(get_json(self.kv.as_ref(), key).await?.unwrap_or_default())
    }

    async fn update<T, R, F>(&self, key: &str, mutate: F) -> Result<R, StoreError>
    where
        T: DeserializeOwned + Serialize + Default,
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.write_lock.lock().await;
        let mut value: T = self.read_or_default(key).await?;
        let out = mutate(&mut value);
        put_json(self.kv.as_ref(), key, &value).await?;
        Ok(out)
    }

    // Articles

    pub async fn articles(&self) -> Result<Vec<Article>, StoreError> {
        self.read_or_default(ARTICLES_KEY).await
    }

    pub async fn article(&self, id: &str) -> Result<Option<Article>, StoreError> {
        Ok(self.articles().await?.into_iter().find(|a| a.id == id))
    }

    pub async fn save_articles(&self, articles: &[Article]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        put_json(self.kv.as_ref(), ARTICLES_KEY, articles).await
    }

    pub async fn update_articles<R, F>(&self, mutate: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<Article>) -> R,
    {
        self.update(ARTICLES_KEY, mutate).await
    }

    pub async fn publish_articles(&self, fresh: Vec<Article>) -> Result<usize, StoreError> {
        self.update_articles(|articles: &mut Vec<Article>| {
            prepend_capped(articles, fresh);
            articles.len()
        })
        .await
    }

    pub async fn delete_article(&self, id: &str) -> Result<bool, StoreError> {
        let removed = self
            .update_articles(|articles: &mut Vec<Article>| {
                let before = articles.len();
                articles.retain(|a| a.id != id);
                before != articles.len()
            })
            .await?;
        if removed {
            self.update_stats(|s| s.forget_article(id)).await?;
        }
        Ok(removed)
    }

    pub async fn clear_articles(&self) -> Result<usize, StoreError> {
        let removed = self
            .update_articles(|articles: &mut Vec<Article>| {
                let n = articles.len();
                articles.clear();
                n
            })
            .await?;
        self.update_stats(|s| s.article_views.clear()).await?;
        Ok(removed)
    }

    // Stats

    pub async fn stats(&self) -> Result<Stats, StoreError> {
        self.read_or_default(STATS_KEY).await
    }

    pub async fn update_stats<R, F>(&self, mutate: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Stats) -> R,
    {
        self.update(STATS_KEY, mutate).await
    }

    // Config

    pub async fn site_config(&self) -> Result<SiteConfig, StoreError> {
        self.read_or_default(CONFIG_KEY).await
    }

    pub async fn save_site_config(&self, config: &SiteConfig) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        put_json(self.kv.as_ref(), CONFIG_KEY, config).await
    }

    pub async fn update_site_config<R, F>(&self, mutate: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut SiteConfig) -> R,
    {
        self.update(CONFIG_KEY, mutate).await
    }

    // Cron logs

    pub async fn cron_logs(&self) -> Result<Vec<CronLog>, StoreError> {
        self.read_or_default(CRON_LOGS_KEY).await
    }

    pub async fn push_cron_log(&self, log: CronLog) -> Result<(), StoreError> {
        self.update(CRON_LOGS_KEY, |logs: &mut Vec<CronLog>| {
            logs.insert(0, log);
            logs.truncate(MAX_CRON_LOGS);
        })
        .await
    }

    // Lifecycle

    pub async fn initialized(&self) -> Result<Option<InitMarker>, StoreError> {
        get_json(self.kv.as_ref(), INITIALIZED_KEY).await
    }

    pub async fn mark_initialized(&self, version: &str) -> Result<(), StoreError> {
        let marker = InitMarker {
            at: Utc::now(),
            version: version.to_string(),
        };
        put_json(self.kv.as_ref(), INITIALIZED_KEY, &marker).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::article::{MAX_ARTICLES, sample_article};
    use crate::models::{RunStatus, Trigger};

    fn log(id: &str) -> CronLog {
        CronLog {
            id: id.to_string(),
            trigger: Trigger::Cron,
            bucket: "morning".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            requested: 1,
            published: 1,
            article_ids: vec![],
            errors: vec![],
            status: RunStatus::Success,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let store = SiteStore::in_memory();
        assert!(store.articles().await.unwrap().is_empty());
        assert_eq!(store.stats().await.unwrap(), Stats::default());
        assert_eq!(store.site_config().await.unwrap(), SiteConfig::default());
        assert!(store.initialized().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_publish_prepends_and_caps() {
        let store = SiteStore::in_memory();
        let old: Vec<Article> = (0..MAX_ARTICLES)
            .map(|i| sample_article(&format!("old{i}"), "Old", "world"))
            .collect();
        store.save_articles(&old).await.unwrap();

        let len = store
            .publish_articles(vec![sample_article("fresh", "Fresh", "world")])
            .await
            .unwrap();
        assert_eq!(len, MAX_ARTICLES);
        let articles = store.articles().await.unwrap();
        assert_eq!(articles[0].id, "fresh");
    }

    #[tokio::test]
    async fn test_delete_article_forgets_views() {
        let store = SiteStore::in_memory();
        store
            .publish_articles(vec![sample_article("a1", "One", "world")])
            .await
            .unwrap();
        store
            .update_stats(|s| {
                s.article_views.insert("a1".into(), 3);
            })
            .await
            .unwrap();

        assert!(store.delete_article("a1").await.unwrap());
        assert!(!store.delete_article("a1").await.unwrap());
        assert!(store.stats().await.unwrap().article_views.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_writes() {
        let store = Arc::new(SiteStore::in_memory());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update_stats(|s| s.total_views += 1).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.stats().await.unwrap().total_views, 20);
    }

    #[tokio::test]
    async fn test_cron_logs_newest_first_and_capped() {
        let store = SiteStore::in_memory();
        for i in 0..(MAX_CRON_LOGS + 5) {
            store.push_cron_log(log(&format!("r{i}"))).await.unwrap();
        }
        let logs = store.cron_logs().await.unwrap();
        assert_eq!(logs.len(), MAX_CRON_LOGS);
        assert_eq!(logs[0].id, format!("r{}", MAX_CRON_LOGS + 4));
    }
}
