pub mod hackernews;
pub mod reddit;
pub mod rss;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use scraper::Html;

use crate::config::SourceConfig;

pub(crate) const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
pub(crate) const USER_AGENT: &str = "newsdesk/0.1 (+https://github.com/newsdesk)";

/// Raw material for one article, as pulled from an outlet.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceItem {
    pub title: String,
    pub url: String,
    /// Plain text, HTML already stripped.
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
    pub source: String,
    pub category: String,
    pub image_url: Option<String>,
}

impl SourceItem {
    pub fn is_usable(&self) -> bool {
        !self.title.trim().is_empty() && self.url.starts_with("http")
    }
}

/// Where the pipeline gets its raw items from.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, sources: &[SourceConfig]) -> Vec<SourceItem>;
}

pub struct HttpSourceFetcher {
    http_client: Arc<reqwest::Client>,
}

impl HttpSourceFetcher {
    pub fn new(http_client: Arc<reqwest::Client>) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch(&self, sources: &[SourceConfig]) -> Vec<SourceItem> {
        fetch_all(sources, &self.http_client).await
    }
}

pub async fn fetch_all(sources: &[SourceConfig], http_client: &reqwest::Client) -> Vec<SourceItem> {
    let futures: Vec<_> = sources
        .iter()
        .map(|source| async move {
            let label = source.label();
            let result = match source {
                SourceConfig::Rss {
                    name,
                    url,
                    category,
                    limit,
                } => rss::fetch_feed(http_client, url, *limit, name, category).await,
                SourceConfig::Reddit {
                    subreddit,
                    category,
                    limit,
                } => reddit::fetch_subreddit(http_client, subreddit, *limit, category).await,
                SourceConfig::HackerNews { category, limit } => {
                    hackernews::fetch_top(http_client, *limit, category).await
                }
            };
            match result {
                Ok(items) => {
                    tracing::info!(source = %label, count = items.len(), "Fetched source");
                    items
                }
                Err(e) => {
                    tracing::error!(source = %label, error = %e, "Failed to fetch source");
                    Vec::new()
                }
            }
        })
        .collect();

    join_all(futures).await.into_iter().flatten().collect()
}

/// Text content of an HTML fragment with whitespace collapsed.
pub fn strip_html(html: &str) -> String {
    if !html.contains('<') && !html.contains('&') {
        return collapse_whitespace(html);
    }
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html() {
        assert_eq!(
            strip_html("<p>Markets <b>rallied</b>&nbsp;today.</p><img src=\"x.png\">"),
            "Markets rallied today."
        );
        assert_eq!(strip_html("  plain\n text "), "plain text");
        assert_eq!(strip_html("Tom &amp; Jerry"), "Tom & Jerry");
    }

    #[test]
    fn test_is_usable() {
        let mut item = SourceItem {
            title: "Title".into(),
            url: "https://example.com/a".into(),
            summary: String::new(),
            published: None,
            source: "Example".into(),
            category: "world".into(),
            image_url: None,
        };
        assert!(item.is_usable());
        item.url = "/relative".into();
        assert!(!item.is_usable());
        item.url = "https://example.com".into();
        item.title = "  ".into();
        assert!(!item.is_usable());
    }

    #[tokio::test]
    async fn test_fetch_all_empty() {
        let client = reqwest::Client::new();
        assert!(fetch_all(&[], &client).await.is_empty());
    }
}
