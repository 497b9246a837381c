use anyhow::{Context, Result};

use crate::config::Config;
use crate::models::{CronLog, SiteConfig, Stats};
use crate::store::{ARTICLES_KEY, CRON_LOGS_KEY, SiteStore, put_json};

/// Write default blobs the first time the store is used.
/// Returns true when initialization ran.
pub async fn initialize_system(store: &SiteStore, config: &Config) -> Result<bool> {
    if let Some(marker) = store.initialized().await.context("failed to read init marker")? {
        tracing::debug!(at = %marker.at, version = %marker.version, "System already initialized");
        return Ok(false);
    }

    let site = SiteConfig {
        site_name: config.site_name.clone(),
        base_url: config.site_url.clone(),
        ..SiteConfig::default()
    };
    store
        .save_site_config(&site)
        .await
        .context("failed to write default site config")?;

    let today = chrono::Utc::now().with_timezone(&config.site_offset()).date_naive();
    store
        .update_stats(|stats| {
            if *stats == Stats::default() {
                stats.last_reset = Some(today);
            }
        })
        .await
        .context("failed to write initial stats")?;

    if store.kv().get(ARTICLES_KEY).await?.is_none() {
        store.save_articles(&[]).await.context("failed to write article list")?;
    }
    if store.kv().get(CRON_LOGS_KEY).await?.is_none() {
        put_json(store.kv(), CRON_LOGS_KEY, &Vec::<CronLog>::new())
            .await
            .context("failed to write cron log")?;
    }

    store
        .mark_initialized(env!("CARGO_PKG_VERSION"))
        .await
        .context("failed to write init marker")?;

    tracing::info!(site = %site.site_name, "Initialized system defaults");
    Ok(true)
}
