use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;

use super::{FETCH_TIMEOUT, SourceItem, USER_AGENT, strip_html};

pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    limit: usize,
    source_name: &str,
    category: &str,
) -> Result<Vec<SourceItem>> {
    let bytes = client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .context("failed to fetch feed")?
        .error_for_status()
        .with_context(|| format!("feed returned error status: {url}"))?
        .bytes()
        .await
        .context("failed to read feed body")?;

    parse_feed(&bytes, limit, source_name, category)
}

pub fn parse_feed(
    bytes: &[u8],
    limit: usize,
    source_name: &str,
    category: &str,
) -> Result<Vec<SourceItem>> {
    let feed = feed_rs::parser::parse(bytes).context("failed to parse feed")?;

    let items = feed
        .entries
        .into_iter()
        .take(limit)
        .map(|entry| entry_to_item(entry, source_name, category))
        .collect();

    Ok(items)
}

fn entry_to_item(entry: Entry, source_name: &str, category: &str) -> SourceItem {
    let image_url = first_media_url(&entry);
    let title = entry
        .title
        .map(|t| strip_html(&t.content))
        .unwrap_or_default();
    let url = entry
        .links
        .first()
        .map(|l| l.href.clone())
        .unwrap_or_default();
    let summary = entry
        .summary
        .map(|s| s.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .map(|html| strip_html(&html))
        .unwrap_or_default();
    let published: Option<DateTime<Utc>> = entry.published.or(entry.updated);

    SourceItem {
        title,
        url,
        summary,
        published,
        source: source_name.to_string(),
        category: category.to_string(),
        image_url,
    }
}

fn first_media_url(entry: &Entry) -> Option<String> {
    entry.media.iter().find_map(|media| {
        media
            .content
            .iter()
            .find_map(|c| c.url.as_ref().map(|u| u.to_string()))
            .or_else(|| media.thumbnails.first().map(|t| t.image.uri.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
          <channel>
            <title>Test Feed</title>
            <item>
              <title>Article One</title>
              <link>https://example.com/1</link>
              <description><![CDATA[<p>Summary of <b>article</b> one</p>]]></description>
              <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
              <media:thumbnail url="https://img.example.com/1.jpg" width="240" height="135"/>
            </item>
            <item>
              <title>Article Two</title>
              <link>https://example.com/2</link>
              <description>Summary of article two</description>
            </item>
            <item>
              <title>Article Three</title>
              <link>https://example.com/3</link>
            </item>
          </channel>
        </rss>"#;

    #[test]
    fn test_parse_rss2_feed() {
        let items = parse_feed(RSS.as_bytes(), 10, "Example News", "world").unwrap();
        assert_eq!(items.len(), 3);

        let first = &items[0];
        assert_eq!(first.title, "Article One");
        assert_eq!(first.url, "https://example.com/1");
        assert_eq!(first.summary, "Summary of article one");
        assert_eq!(first.source, "Example News");
        assert_eq!(first.category, "world");
        assert!(first.published.is_some());
        assert_eq!(first.image_url.as_deref(), Some("https://img.example.com/1.jpg"));

        assert!(items[1].image_url.is_none());
        assert!(items[2].summary.is_empty());
    }

    #[test]
    fn test_parse_atom_feed() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <feed xmlns="http://www.w3.org/2005/Atom">
          <title>Test Atom Feed</title>
          <entry>
            <title>Atom Entry</title>
            <link href="https://example.com/atom/1"/>
            <summary>Atom summary</summary>
            <updated>2024-01-01T00:00:00Z</updated>
          </entry>
        </feed>"#;

        let items = parse_feed(xml.as_bytes(), 10, "Atom", "technology").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Atom Entry");
        assert_eq!(items[0].summary, "Atom summary");
        assert!(items[0].published.is_some());
    }

    #[test]
    fn test_limit_applied() {
        let items = parse_feed(RSS.as_bytes(), 2, "Example", "world").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].title, "Article Two");
    }

    #[test]
    fn test_invalid_feed_is_error() {
        assert!(parse_feed(b"not xml at all", 5, "Broken", "world").is_err());
    }
}
