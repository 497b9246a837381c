use anyhow::{Context, Result};
use chrono::DateTime;
use serde::Deserialize;

use super::{FETCH_TIMEOUT, SourceItem, USER_AGENT, strip_html};

const REDDIT_BASE: &str = "https://www.reddit.com";

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    title: String,
    #[serde(default)]
    url: Option<String>,
    permalink: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    over_18: bool,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    thumbnail: Option<String>,
}

pub async fn fetch_subreddit(
    client: &reqwest::Client,
    subreddit: &str,
    limit: usize,
    category: &str,
) -> Result<Vec<SourceItem>> {
    let url = format!("{REDDIT_BASE}/r/{subreddit}/top.json");
    let body = client
        .get(&url)
        .query(&[("t", "day"), ("limit", &limit.to_string())])
        .header("User-Agent", USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .context("failed to fetch subreddit")?
        .error_for_status()
        .with_context(|| format!("reddit returned error status for r/{subreddit}"))?
        .text()
        .await
        .context("failed to read subreddit body")?;

    parse_listing(&body, subreddit, limit, category)
}

pub fn parse_listing(
    body: &str,
    subreddit: &str,
    limit: usize,
    category: &str,
) -> Result<Vec<SourceItem>> {
    let listing: Listing = serde_json::from_str(body).context("failed to parse reddit listing")?;

    let items = listing
        .data
        .children
        .into_iter()
        .map(|c| c.data)
        .filter(|post| !post.stickied && !post.over_18)
        .take(limit)
        .map(|post| {
            let permalink = format!("{REDDIT_BASE}{}", post.permalink);
            let url = match post.url {
                Some(u) if !post.is_self && u.starts_with("http") => u,
                _ => permalink,
            };
            let source = if post.is_self || post.domain.is_empty() {
                format!("r/{subreddit}")
            } else {
                post.domain.trim_start_matches("www.").to_string()
            };
            let image_url = post
                .thumbnail
                .filter(|t| t.starts_with("http"));

            SourceItem {
                title: strip_html(&post.title),
                url,
                summary: strip_html(&post.selftext),
                published: DateTime::from_timestamp(post.created_utc as i64, 0),
                source,
                category: category.to_string(),
                image_url,
            }
        })
        .collect();

    Ok(items)
}
