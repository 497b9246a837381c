use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use croner::Cron;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::{PriorityBucket, PriorityTable, site_hour};
use crate::models::Trigger;
use crate::store::SiteStore;
use crate::tasks::pipeline::{Pipeline, PipelineError, PipelineReport, PipelineRequest};

/// Most articles a manual run may ask for.
pub const MAX_MANUAL_COUNT: u32 = 10;

#[derive(Debug)]
pub enum TickOutcome {
    Paused,
    Ran(PipelineReport),
}

/// Drives the pipeline from a cron schedule evaluated in site-local time.
pub struct PublishScheduler {
    cron: Cron,
    schedule: String,
    store: Arc<SiteStore>,
    pipeline: Arc<Pipeline>,
    priority: Arc<PriorityTable>,
    offset: FixedOffset,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PublishScheduler {
    pub fn new(
        schedule: &str,
        store: Arc<SiteStore>,
        pipeline: Arc<Pipeline>,
        priority: Arc<PriorityTable>,
        offset: FixedOffset,
    ) -> Result<Self> {
        let cron = Cron::new(schedule)
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid cron expression '{}': {}", schedule, e))?;

        Ok(Self {
            cron,
            schedule: schedule.to_string(),
            store,
            pipeline,
            priority,
            offset,
            handle: Mutex::new(None),
        })
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub fn priority(&self) -> &PriorityTable {
        &self.priority
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.next_after(Utc::now())
    }

    fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron
            .find_next_occurrence(&now.with_timezone(&self.offset), false)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    pub fn current_bucket(&self, now: DateTime<Utc>) -> Option<&PriorityBucket> {
        self.priority.bucket_for_hour(site_hour(now, self.offset))
    }

    pub async fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::debug!("Scheduler already running");
            return;
        }
        let scheduler = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            scheduler.run_loop().await;
        }));
        tracing::info!(schedule = %self.schedule, "Started publish scheduler");
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            tracing::info!("Stopped publish scheduler");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    async fn run_loop(&self) {
        loop {
            let now = Utc::now();
            let Some(next) = self.next_after(now) else {
                tracing::error!(schedule = %self.schedule, "Failed to compute next cron occurrence");
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                continue;
            };

            let duration = (next - now).to_std().unwrap_or(std::time::Duration::from_secs(1));
            tracing::info!(
                next = %next.format("%Y-%m-%d %H:%M:%S UTC"),
                "Sleeping until next publish run"
            );
            tokio::time::sleep(duration).await;

            // Guard against premature wake from sleep imprecision
            let now_after = Utc::now();
            if now_after < next {
                let remaining = (next - now_after).to_std().unwrap_or_default();
                tokio::time::sleep(remaining).await;
            }

            match self.tick(Trigger::Cron, Utc::now()).await {
                Ok(TickOutcome::Paused) => tracing::info!("Autopublish paused, skipping run"),
                Ok(TickOutcome::Ran(report)) => tracing::info!(
                    published = report.published.len(),
                    status = ?report.status,
                    "Scheduled run complete"
                ),
                Err(e) => match e.downcast_ref::<PipelineError>() {
                    Some(PipelineError::AlreadyRunning) => {
                        tracing::warn!("Previous run still in progress, skipping this tick")
                    }
                    _ => tracing::error!(error = %e, "Scheduled run failed"),
                },
            }
        }
    }

    /// One scheduled (or forced) run. Respects the autopublish switch
    /// unless forced.
    pub async fn tick(&self, trigger: Trigger, now: DateTime<Utc>) -> Result<TickOutcome> {
        let site = self
            .store
            .site_config()
            .await
            .context("failed to read site config")?;
        if !site.strategy.autopublish && trigger != Trigger::Forced {
            return Ok(TickOutcome::Paused);
        }

        let bucket = self
            .current_bucket(now)
            .context("no priority bucket covers the current hour")?;
        let count = bucket.articles.min(site.strategy.articles_per_run);
        let report = self.run_bucket(trigger, bucket, count).await?;
        Ok(TickOutcome::Ran(report))
    }

    /// Manual run: pick the bucket by name or by the current hour, with an
    /// optional article count.
    pub async fn run_now(
        &self,
        trigger: Trigger,
        bucket_name: Option<&str>,
        count: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<PipelineReport> {
        let bucket = match bucket_name {
            Some(name) => self
                .priority
                .by_name(name)
                .with_context(|| format!("unknown priority bucket '{name}'"))?,
            None => self
                .current_bucket(now)
                .context("no priority bucket covers the current hour")?,
        };
        let count = count.unwrap_or(bucket.articles).clamp(1, MAX_MANUAL_COUNT);
        self.run_bucket(trigger, bucket, count).await
    }

    async fn run_bucket(
        &self,
        trigger: Trigger,
        bucket: &PriorityBucket,
        count: u32,
    ) -> Result<PipelineReport> {
        tracing::info!(
            trigger = trigger.as_str(),
            bucket = %bucket.name,
            count,
            "Running pipeline"
        );
        let request = PipelineRequest {
            trigger,
            bucket: bucket.name.clone(),
            sources: bucket.sources.clone(),
            count,
        };
        Ok(self.pipeline.run(request).await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tasks::ai::{AiError, ArticleWriter, GeneratedArticle};
    use crate::tasks::sources::{SourceFetcher, SourceItem};
    use async_trait::async_trait;
    use chrono::TimeZone;

    pub(crate) struct StaticFetcher;

    #[async_trait]
    impl SourceFetcher for StaticFetcher {
        async fn fetch(&self, sources: &[crate::config::SourceConfig]) -> Vec<SourceItem> {
            (0..5)
                .map(|i| SourceItem {
                    title: format!("Story {i} from {} sources", sources.len()),
                    url: format!("https://example.com/{i}"),
                    summary: "Summary".into(),
                    published: None,
                    source: "Wire".into(),
                    category: "world".into(),
                    image_url: None,
                })
                .collect()
        }
    }

    pub(crate) struct EchoWriter;

    #[async_trait]
    impl ArticleWriter for EchoWriter {
        async fn rewrite(
            &self,
            item: &SourceItem,
            _categories: &[String],
        ) -> Result<GeneratedArticle, AiError> {
            Ok(GeneratedArticle {
                title: format!("New: {}", item.title),
                content: "Body".into(),
                preview: "Preview".into(),
                category: "world".into(),
            })
        }

        async fn ping(&self) -> Result<String, AiError> {
            Ok("pong".into())
        }
    }

    pub(crate) fn scheduler(store: Arc<SiteStore>) -> Arc<PublishScheduler> {
        let offset = FixedOffset::east_opt(0).unwrap();
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(StaticFetcher),
            Arc::new(EchoWriter),
            None,
            vec![],
            offset,
        ));
        Arc::new(
            PublishScheduler::new(
                "0 */2 * * *",
                store,
                pipeline,
                Arc::new(PriorityTable::default()),
                offset,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_cron_parse_invalid() {
        let store = Arc::new(SiteStore::in_memory());
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(StaticFetcher),
            Arc::new(EchoWriter),
            None,
            vec![],
            FixedOffset::east_opt(0).unwrap(),
        ));
        let result = PublishScheduler::new(
            "not a cron",
            store,
            pipeline,
            Arc::new(PriorityTable::default()),
            FixedOffset::east_opt(0).unwrap(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_next_run_in_site_time() {
        let store = Arc::new(SiteStore::in_memory());
        let s = scheduler(store);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 30, 0).unwrap();
        let next = s.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_tick_uses_bucket_for_hour() {
        let store = Arc::new(SiteStore::in_memory());
        let s = scheduler(store.clone());
        // 07:00 is in the morning bucket, 3 articles
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap();
        let TickOutcome::Ran(report) = s.tick(Trigger::Cron, now).await.unwrap() else {
            panic!("expected a run");
        };
        assert_eq!(report.bucket, "morning");
        assert_eq!(report.published.len(), 3);
        assert_eq!(store.articles().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_tick_respects_pause_unless_forced() {
        let store = Arc::new(SiteStore::in_memory());
        store
            .update_site_config(|c| c.strategy.autopublish = false)
            .await
            .unwrap();
        let s = scheduler(store.clone());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();

        assert!(matches!(
            s.tick(Trigger::Cron, now).await.unwrap(),
            TickOutcome::Paused
        ));
        assert!(store.articles().await.unwrap().is_empty());

        let TickOutcome::Ran(report) = s.tick(Trigger::Forced, now).await.unwrap() else {
            panic!("forced tick should run");
        };
        assert_eq!(report.bucket, "overnight");
        assert_eq!(report.published.len(), 1);
    }

    #[tokio::test]
    async fn test_run_now_by_name_and_count() {
        let store = Arc::new(SiteStore::in_memory());
        let s = scheduler(store);
        let report = s
            .run_now(Trigger::Manual, Some("midday"), Some(2), Utc::now())
            .await
            .unwrap();
        assert_eq!(report.bucket, "midday");
        assert_eq!(report.published.len(), 2);

        assert!(s.run_now(Trigger::Manual, Some("brunch"), None, Utc::now()).await.is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let s = scheduler(Arc::new(SiteStore::in_memory()));
        assert!(!s.is_running().await);
        s.start().await;
        assert!(s.is_running().await);
        s.start().await;
        s.stop().await;
        assert!(!s.is_running().await);
        assert!(s.next_run().is_some());
    }
}
