use anyhow::{Context, Result};
use chrono::DateTime;
use futures::future::join_all;
use serde::Deserialize;

use super::{FETCH_TIMEOUT, SourceItem, USER_AGENT, strip_html};

const HN_API: &str = "https://hacker-news.firebaseio.com/v0";
const SOURCE_NAME: &str = "Hacker News";

#[derive(Debug, Deserialize)]
struct HnItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    dead: bool,
    #[serde(default)]
    deleted: bool,
}

pub async fn fetch_top(
    client: &reqwest::Client,
    limit: usize,
    category: &str,
) -> Result<Vec<SourceItem>> {
    let ids: Vec<u64> = client
        .get(format!("{HN_API}/topstories.json"))
        .header("User-Agent", USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .context("failed to fetch top stories")?
        .error_for_status()
        .context("hacker news returned error status")?
        .json()
        .await
        .context("failed to parse top stories")?;

    // over-fetch a little since link-less items are dropped
    let futures = ids
        .into_iter()
        .take(limit * 2)
        .map(|id| fetch_item(client, id));
    let fetched = join_all(futures).await;

    let items = fetched
        .into_iter()
        .filter_map(|result| match result {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping hacker news item");
                None
            }
        })
        .filter_map(|item| item_to_source(item, category))
        .take(limit)
        .collect();

    Ok(items)
}

async fn fetch_item(client: &reqwest::Client, id: u64) -> Result<HnItem> {
    client
        .get(format!("{HN_API}/item/{id}.json"))
        .header("User-Agent", USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .with_context(|| format!("failed to fetch item {id}"))?
        .error_for_status()?
        .json()
        .await
        .with_context(|| format!("failed to parse item {id}"))
}

fn item_to_source(item: HnItem, category: &str) -> Option<SourceItem> {
    if item.dead || item.deleted {
        return None;
    }
    let title = item.title.filter(|t| !t.trim().is_empty())?;
    let url = item.url.filter(|u| u.starts_with("http"))?;

    Some(SourceItem {
        title,
        url,
        summary: item.text.map(|t| strip_html(&t)).unwrap_or_default(),
        published: DateTime::from_timestamp(item.time, 0),
        source: SOURCE_NAME.to_string(),
        category: category.to_string(),
        image_url: None,
    })
}
