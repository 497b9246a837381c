use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::SourceConfig;
use crate::models::article::{
    format_display_date, new_article_id, normalize_title, refresh_trending, slugify,
};
use crate::models::{Article, CronLog, RunStatus, SiteConfig, Trigger};
use crate::schedule::{Budget, site_date};
use crate::store::{SiteStore, StoreError};
use crate::tasks::ai::{ArticleWriter, ImageGenerator};
use crate::tasks::images::acquire_image;
use crate::tasks::sinks::Sink;
use crate::tasks::sources::{SourceFetcher, SourceItem};
use crate::telegram::format::{escape_markdown, link_text};

/// Candidates tried per requested article before giving up.
const ATTEMPTS_PER_ARTICLE: usize = 2;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a publishing run is already in progress")]
    AlreadyRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub trigger: Trigger,
    pub bucket: String,
    pub sources: Vec<SourceConfig>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedArticle {
    pub id: String,
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub run_id: String,
    pub trigger: Trigger,
    pub bucket: String,
    pub requested: u32,
    pub allowed: u32,
    pub fetched: usize,
    pub candidates: usize,
    pub published: Vec<PublishedArticle>,
    pub errors: Vec<String>,
    pub skipped: Option<String>,
    pub status: RunStatus,
    pub remaining_today: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineReport {
    fn new(request: &PipelineRequest, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: new_article_id(),
            trigger: request.trigger,
            bucket: request.bucket.clone(),
            requested: request.count,
            allowed: 0,
            fetched: 0,
            candidates: 0,
            published: Vec::new(),
            errors: Vec::new(),
            skipped: None,
            status: RunStatus::Skipped,
            remaining_today: 0,
            started_at,
            finished_at: started_at,
        }
    }

    fn skip(mut self, reason: &str) -> Self {
        self.skipped = Some(reason.to_string());
        self.status = RunStatus::Skipped;
        self
    }

    fn settle_status(&mut self) {
        let published = self.published.len() as u32;
        self.status = if published == 0 {
            RunStatus::Failed
        } else if published < self.allowed || !self.errors.is_empty() {
            RunStatus::Partial
        } else {
            RunStatus::Success
        };
    }

    pub fn to_cron_log(&self) -> CronLog {
        CronLog {
            id: self.run_id.clone(),
            trigger: self.trigger,
            bucket: self.bucket.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            requested: self.requested as usize,
            published: self.published.len(),
            article_ids: self.published.iter().map(|p| p.id.clone()).collect(),
            errors: self.errors.clone(),
            status: self.status,
            note: self.skipped.clone(),
        }
    }

    /// Markdown summary for admin chats.
    pub fn summary(&self, site: &SiteConfig) -> String {
        let head = match self.status {
            RunStatus::Success => "✅",
            RunStatus::Partial => "⚠️",
            RunStatus::Skipped => "⏭",
            RunStatus::Failed => "❌",
        };
        let mut out = format!(
            "{head} *Published {}/{}* ({}, {})\n",
            self.published.len(),
            self.allowed.max(self.requested),
            escape_markdown(&self.bucket),
            self.trigger.as_str()
        );
        if let Some(reason) = &self.skipped {
            out.push_str(&format!("Skipped: {}\n", escape_markdown(reason)));
        }
        for article in &self.published {
            out.push_str(&format!(
                "• [{}]({})\n",
                link_text(&article.title),
                site.absolute_url(&article.path)
            ));
        }
        if !self.errors.is_empty() {
            out.push_str(&format!("\n{} error(s):\n", self.errors.len()));
            for error in self.errors.iter().take(5) {
                out.push_str(&format!("• {}\n", escape_markdown(error)));
            }
        }
        out.push_str(&format!(
            "\nFetched {} items, {} new. Remaining today: {}",
            self.fetched, self.candidates, self.remaining_today
        ));
        out
    }
}

pub struct Pipeline {
    store: Arc<SiteStore>,
    fetcher: Arc<dyn SourceFetcher>,
    writer: Arc<dyn ArticleWriter>,
    images: Option<Arc<dyn ImageGenerator>>,
    sinks: Vec<Arc<dyn Sink>>,
    offset: FixedOffset,
    run_guard: Mutex<()>,
}

impl Pipeline {
    pub fn new(
        store: Arc<SiteStore>,
        fetcher: Arc<dyn SourceFetcher>,
        writer: Arc<dyn ArticleWriter>,
        images: Option<Arc<dyn ImageGenerator>>,
        sinks: Vec<Arc<dyn Sink>>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            fetcher,
            writer,
            images,
            sinks,
            offset,
            run_guard: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    #[tracing::instrument(skip_all, fields(trigger = request.trigger.as_str(), bucket = %request.bucket))]
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineReport, PipelineError> {
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| PipelineError::AlreadyRunning)?;

        let started = Utc::now();
        let mut report = PipelineReport::new(&request, started);
        let site = self.store.site_config().await?;
        let budget = Budget::from_strategy(&site.strategy);

        let stats = self.prepare_stats(started, &budget).await?;
        let remaining = budget.remaining(&stats);
        report.allowed = request.count.min(remaining);
        report.remaining_today = remaining;

        if request.count == 0 {
            return Ok(self.finish(report.skip("no articles requested"), &site).await);
        }
        if report.allowed == 0 {
            tracing::info!(
                published_today = stats.daily_articles_published,
                spend_today = stats.daily_spend_usd,
                "Daily limit reached, skipping run"
            );
            return Ok(self.finish(report.skip("daily limit reached"), &site).await);
        }

        let items = self.fetcher.fetch(&request.sources).await;
        report.fetched = items.len();
        let existing = self.store.articles().await?;
        let candidates = select_candidates(items, &existing);
        report.candidates = candidates.len();
        tracing::info!(
            fetched = report.fetched,
            candidates = report.candidates,
            allowed = report.allowed,
            "Selected candidates"
        );

        if candidates.is_empty() {
            return Ok(self.finish(report.skip("no new items from sources"), &site).await);
        }

        let mut seen_titles: HashSet<String> =
            existing.iter().map(|a| normalize_title(&a.title)).collect();
        let max_attempts = report.allowed as usize * ATTEMPTS_PER_ARTICLE;

        for item in candidates.iter().take(max_attempts) {
            if report.published.len() as u32 >= report.allowed {
                break;
            }

            let article = match self.build_article(item, &site, &mut seen_titles).await {
                Ok(article) => article,
                Err(reason) => {
                    tracing::warn!(title = %item.title, reason = %reason, "Skipping item");
                    report.errors.push(format!("{}: {reason}", item.title));
                    continue;
                }
            };

            let published = PublishedArticle {
                id: article.id.clone(),
                title: article.title.clone(),
                path: article.canonical_path(),
            };
            let published_at = article.published_at().unwrap_or_else(Utc::now);

            if let Err(e) = self.store.publish_articles(vec![article]).await {
                tracing::error!(error = %e, "Failed to store article, aborting run");
                report.errors.push(format!("store: {e}"));
                break;
            }
            tracing::info!(id = %published.id, title = %published.title, "Published article");
            report.published.push(published);

            // The article is live; counters lag behind until the next run
            // reconciles them, so stop publishing more.
            if let Err(e) = self
                .store
                .update_stats(|s| budget.record_publish(s, 1, published_at))
                .await
            {
                tracing::error!(error = %e, "Failed to record publish in stats, stopping run");
                report.errors.push(format!("stats: {e}"));
                break;
            }
        }

        if !report.published.is_empty() {
            let now = Utc::now();
            if let Err(e) = self
                .store
                .update_articles(|articles| refresh_trending(articles, now))
                .await
            {
                tracing::warn!(error = %e, "Failed to refresh trending flags");
                report.errors.push(format!("trending: {e}"));
            }
        }

        match self.store.stats().await {
            Ok(stats) => report.remaining_today = budget.remaining(&stats),
            Err(e) => tracing::warn!(error = %e, "Failed to re-read stats after run"),
        }
        report.settle_status();
        Ok(self.finish(report, &site).await)
    }

    /// Roll daily counters over and reconcile them with stored articles.
    async fn prepare_stats(
        &self,
        now: DateTime<Utc>,
        budget: &Budget,
    ) -> Result<crate::models::Stats, PipelineError> {
        let today = site_date(now, self.offset);
        let offset = self.offset;
        let observed = self
            .store
            .articles()
            .await?
            .iter()
            .filter(|a| a.local_date(offset) == Some(today))
            .count() as u32;
        let cost = budget.cost_per_article_usd;

        let stats = self
            .store
            .update_stats(|s| {
                if s.roll_over(today) {
                    tracing::info!(%today, "Reset daily counters");
                }
                if let Some(previous) = s.reconcile_daily(observed, cost) {
                    tracing::warn!(
                        stored = previous,
                        observed,
                        "Daily counter mismatch, resetting to stored articles"
                    );
                }
                s.clone()
            })
            .await?;
        Ok(stats)
    }

    async fn build_article(
        &self,
        item: &SourceItem,
        site: &SiteConfig,
        seen_titles: &mut HashSet<String>,
    ) -> Result<Article, String> {
        let generated = self
            .writer
            .rewrite(item, &site.categories)
            .await
            .map_err(|e| e.to_string())?;

        let normalized = normalize_title(&generated.title);
        if !seen_titles.insert(normalized) {
            return Err("generated headline duplicates an existing article".to_string());
        }

        let category = site.pick_category(&[generated.category.as_str(), item.category.as_str()]);
        if category != generated.category {
            tracing::debug!(
                model = %generated.category,
                source = %item.category,
                chosen = %category,
                "Replaced unlisted category"
            );
        }
        let slug = slugify(&generated.title);
        let image = acquire_image(self.images.as_deref(), &generated.title, &slug, &category).await;
        let now = Utc::now();

        Ok(Article {
            id: new_article_id(),
            slug,
            title: generated.title,
            full_content: generated.content,
            preview: generated.preview,
            category,
            source: item.source.clone(),
            url: item.url.clone(),
            date: format_display_date(now, self.offset),
            timestamp: now.timestamp_millis(),
            views: 0,
            trending: false,
            image: Some(image),
        })
    }

    /// Record the run and tell the admins about it.
    async fn finish(&self, mut report: PipelineReport, site: &SiteConfig) -> PipelineReport {
        report.finished_at = Utc::now();

        if let Err(e) = self.store.push_cron_log(report.to_cron_log()).await {
            tracing::error!(error = %e, "Failed to write cron log");
        }

        let worth_telling = !report.published.is_empty() || report.status == RunStatus::Failed;
        if worth_telling {
            let text = report.summary(site);
            for sink in &self.sinks {
                if let Err(e) = sink.deliver(&text).await {
                    tracing::error!(error = %e, "Failed to deliver run summary");
                }
            }
        }

        tracing::info!(
            status = ?report.status,
            published = report.published.len(),
            errors = report.errors.len(),
            "Pipeline run finished"
        );
        report
    }
}

/// Drop unusable items and anything already published or repeated within
/// the batch, then shuffle so one outlet does not dominate.
pub fn select_candidates(items: Vec<SourceItem>, existing: &[Article]) -> Vec<SourceItem> {
    let mut urls: HashSet<String> = existing.iter().map(|a| a.url.clone()).collect();
    let mut titles: HashSet<String> = existing.iter().map(|a| normalize_title(&a.title)).collect();

    let mut candidates: Vec<SourceItem> = items
        .into_iter()
        .filter(|item| item.is_usable())
        .filter(|item| {
            let fresh_url = urls.insert(item.url.clone());
            let fresh_title = titles.insert(normalize_title(&item.title));
            fresh_url && fresh_title
        })
        .collect();

    candidates.shuffle(&mut rand::rng());
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stats;
    use crate::models::article::sample_article;
    use crate::tasks::ai::{AiError, GeneratedArticle};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockFetcher {
        items: Vec<SourceItem>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SourceFetcher for MockFetcher {
        async fn fetch(&self, _sources: &[SourceConfig]) -> Vec<SourceItem> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.items.clone()
        }
    }

    /// Rewrites every item except those whose title contains FAIL.
    struct MockWriter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ArticleWriter for MockWriter {
        async fn rewrite(
            &self,
            item: &SourceItem,
            _categories: &[String],
        ) -> Result<GeneratedArticle, AiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if item.title.contains("FAIL") {
                return Err(AiError::InvalidResponse("model refused".into()));
            }
            Ok(GeneratedArticle {
                title: format!("Rewritten {}", item.title),
                content: "Paragraph one.\n\nParagraph two.".into(),
                preview: "Preview.".into(),
                category: item.category.clone(),
            })
        }

        async fn ping(&self) -> Result<String, AiError> {
            Ok("pong".into())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn deliver(&self, text: &str) -> Result<()> {
            self.messages.lock().await.push(text.to_string());
            Ok(())
        }
    }

    fn item(n: usize, title: &str) -> SourceItem {
        SourceItem {
            title: title.to_string(),
            url: format!("https://source.example.com/{n}"),
            summary: "Summary.".into(),
            published: None,
            source: "Example Wire".into(),
            category: "world".into(),
            image_url: None,
        }
    }

    struct Harness {
        store: Arc<SiteStore>,
        fetcher: Arc<MockFetcher>,
        writer: Arc<MockWriter>,
        sink: Arc<RecordingSink>,
        pipeline: Pipeline,
    }

    fn harness(items: Vec<SourceItem>) -> Harness {
        let store = Arc::new(SiteStore::in_memory());
        let fetcher = Arc::new(MockFetcher {
            items,
            calls: AtomicUsize::new(0),
        });
        let writer = Arc::new(MockWriter {
            calls: AtomicUsize::new(0),
        });
        let sink = Arc::new(RecordingSink::default());
        let pipeline = Pipeline::new(
            store.clone(),
            fetcher.clone(),
            writer.clone(),
            None,
            vec![sink.clone() as Arc<dyn Sink>],
            FixedOffset::east_opt(0).unwrap(),
        );
        Harness {
            store,
            fetcher,
            writer,
            sink,
            pipeline,
        }
    }

    fn request(count: u32) -> PipelineRequest {
        PipelineRequest {
            trigger: Trigger::Manual,
            bucket: "morning".into(),
            sources: vec![],
            count,
        }
    }

    #[tokio::test]
    async fn test_publishes_requested_count() {
        let h = harness((0..5).map(|i| item(i, &format!("Story {i}"))).collect());
        let report = h.pipeline.run(request(2)).await.unwrap();

        assert_eq!(report.status, RunStatus::Success);
        assert_eq!(report.published.len(), 2);
        assert_eq!(report.fetched, 5);

        let articles = h.store.articles().await.unwrap();
        assert_eq!(articles.len(), 2);
        assert!(articles.iter().all(|a| a.title.starts_with("Rewritten Story")));
        assert!(articles.iter().all(|a| a.image.is_some()));

        let stats = h.store.stats().await.unwrap();
        assert_eq!(stats.daily_articles_published, 2);
        assert_eq!(stats.total_articles_published, 2);
        assert!(stats.last_fetch.is_some());

        let logs = h.store.cron_logs().await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].article_ids.len(), 2);

        let messages = h.sink.messages.lock().await;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Published 2/2"));
    }

    #[tokio::test]
    async fn test_skips_known_and_duplicate_items() {
        let h = harness(vec![
            item(1, "Already here"),
            item(2, "Fresh story"),
            item(2, "Same url different title"),
            item(3, "fresh   STORY!"),
            SourceItem {
                url: String::new(),
                ..item(4, "No link")
            },
        ]);
        let mut existing = sample_article("old1", "Already here", "world");
        existing.url = "https://elsewhere.example.com/x".into();
        h.store.save_articles(&[existing]).await.unwrap();

        let report = h.pipeline.run(request(5)).await.unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.published.len(), 1);
        assert_eq!(report.published[0].title, "Rewritten Fresh story");
        assert_eq!(report.status, RunStatus::Partial);
    }

    #[tokio::test]
    async fn test_daily_limit_skips_without_fetching() {
        let h = harness(vec![item(1, "Story")]);
        h.store
            .update_site_config(|c| c.strategy.daily_limit = 0)
            .await
            .unwrap();

        let report = h.pipeline.run(request(3)).await.unwrap();
        assert_eq!(report.status, RunStatus::Skipped);
        assert_eq!(report.skipped.as_deref(), Some("daily limit reached"));
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(h.sink.messages.lock().await.is_empty());
        assert_eq!(h.store.cron_logs().await.unwrap()[0].status, RunStatus::Skipped);
    }

    #[tokio::test]
    async fn test_budget_caps_count() {
        let h = harness((0..5).map(|i| item(i, &format!("Story {i}"))).collect());
        h.store
            .update_site_config(|c| {
                c.strategy.daily_budget_usd = 0.10;
                c.strategy.cost_per_article_usd = 0.05;
            })
            .await
            .unwrap();

        let report = h.pipeline.run(request(4)).await.unwrap();
        assert_eq!(report.allowed, 2);
        assert_eq!(report.published.len(), 2);
        assert_eq!(report.remaining_today, 0);
    }

    #[tokio::test]
    async fn test_failures_recorded_and_attempts_bounded() {
        let h = harness((0..6).map(|i| item(i, &format!("FAIL {i}"))).collect());
        let report = h.pipeline.run(request(2)).await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.published.is_empty());
        assert_eq!(report.errors.len(), 4);
        assert_eq!(h.writer.calls.load(Ordering::SeqCst), 4);
        // failed runs are still reported
        assert_eq!(h.sink.messages.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_run_refused() {
        let h = harness(vec![item(1, "Story")]);
        let _held = h.pipeline.run_guard.try_lock().unwrap();
        assert!(h.pipeline.is_running());
        let result = h.pipeline.run(request(1)).await;
        assert!(matches!(result, Err(PipelineError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_counter_mismatch_is_reconciled() {
        let h = harness(vec![item(1, "Story")]);
        let today = site_date(Utc::now(), FixedOffset::east_opt(0).unwrap());
        h.store
            .update_stats(|s| {
                *s = Stats {
                    daily_articles_published: 24,
                    daily_spend_usd: 1.2,
                    last_reset: Some(today),
                    ..Default::default()
                }
            })
            .await
            .unwrap();

        let report = h.pipeline.run(request(1)).await.unwrap();
        assert_eq!(report.published.len(), 1);
        assert_eq!(h.store.stats().await.unwrap().daily_articles_published, 1);
    }

    /// Fails every stats write once an article list has been stored.
    #[derive(Default)]
    struct StatsWriteFails {
        inner: crate::store::MemoryKvStore,
        articles_written: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl crate::store::KvStore for StatsWriteFails {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
            if key == crate::store::STATS_KEY && self.articles_written.load(Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            if key == crate::store::ARTICLES_KEY {
                self.articles_written.store(true, Ordering::SeqCst);
            }
            self.inner.put(key, value).await
        }

        async fn delete(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.delete(key).await
        }

        async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list_keys(prefix).await
        }
    }

    #[tokio::test]
    async fn test_stats_failure_after_publish_still_logs_and_notifies() {
        let store = Arc::new(SiteStore::new(Arc::new(StatsWriteFails::default())));
        let sink = Arc::new(RecordingSink::default());
        let pipeline = Pipeline::new(
            store.clone(),
            Arc::new(MockFetcher {
                items: (0..4).map(|i| item(i, &format!("Story {i}"))).collect(),
                calls: AtomicUsize::new(0),
            }),
            Arc::new(MockWriter {
                calls: AtomicUsize::new(0),
            }),
            None,
            vec![sink.clone() as Arc<dyn Sink>],
            FixedOffset::east_opt(0).unwrap(),
        );

        let report = pipeline.run(request(2)).await.unwrap();
        assert_eq!(report.published.len(), 1);
        assert_eq!(report.status, RunStatus::Partial);
        assert!(report.errors.iter().any(|e| e.starts_with("stats:")));
        assert_eq!(store.articles().await.unwrap().len(), 1);

        let logs = store.cron_logs().await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].article_ids, vec![report.published[0].id.clone()]);
        assert!(logs[0].errors.iter().any(|e| e.contains("disk full")));
        assert_eq!(sink.messages.lock().await.len(), 1);
    }

    #[test]
    fn test_summary_link_text_is_not_escaped() {
        let mut report = PipelineReport::new(&request(1), Utc::now());
        report.allowed = 1;
        report.published.push(PublishedArticle {
            id: "abc".into(),
            title: "Rate_cut [live] *now*".into(),
            path: "/business-news/rate-cut-abc".into(),
        });
        report.settle_status();

        let site = SiteConfig {
            base_url: "https://news.example.com".into(),
            ..Default::default()
        };
        let text = report.summary(&site);
        assert!(text.contains("• [Rate_cut live *now*](https://news.example.com/business-news/rate-cut-abc)"));
    }

    #[test]
    fn test_select_candidates_filters() {
        let existing = vec![sample_article("a", "Known headline", "world")];
        let items = vec![
            item(1, "Known Headline"),
            item(2, "New one"),
            item(3, "New one"),
            item(4, "Another"),
        ];
        let mut titles: Vec<String> = select_candidates(items, &existing)
            .into_iter()
            .map(|i| i.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["Another", "New one"]);
    }
}
