use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_ARTICLES: usize = 100;
pub const TRENDING_COUNT: usize = 5;
const MAX_SLUG_LEN: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub full_content: String,
    pub preview: String,
    pub category: String,
    /// Name of the outlet the material came from.
    pub source: String,
    /// Link to the original story.
    pub url: String,
    /// Human readable publish date in site-local time.
    pub date: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub trending: bool,
    #[serde(default)]
    pub image: Option<ArticleImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleImage {
    pub url: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub credit: String,
}

impl Article {
    pub fn canonical_path(&self) -> String {
        format!("/{}-news/{}-{}", self.category, self.slug, self.id)
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Site-local calendar date of publication.
    pub fn local_date(&self, offset: FixedOffset) -> Option<chrono::NaiveDate> {
        self.published_at()
            .map(|t| t.with_timezone(&offset).date_naive())
    }
}

pub fn new_article_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

pub fn format_display_date(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%B %-d, %Y").to_string()
}

pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c == '\'' || c == '’' {
            // drop apostrophes so "don't" becomes "dont"
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
        if let Some(cut) = slug.rfind('-') {
            slug.truncate(cut);
        }
    }

    if slug.is_empty() {
        "story".to_string()
    } else {
        slug
    }
}

/// Split a `{slug}-{id}` path segment into its parts.
pub fn split_slug_id(segment: &str) -> Option<(&str, &str)> {
    let (slug, id) = segment.rsplit_once('-')?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some((slug, id))
}

pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Prepend new articles (newest first) and enforce the list cap.
pub fn prepend_capped(articles: &mut Vec<Article>, fresh: Vec<Article>) {
    let mut merged = fresh;
    merged.append(articles);
    merged.truncate(MAX_ARTICLES);
    *articles = merged;
}

/// Mark the most viewed recent articles as trending.
pub fn refresh_trending(articles: &mut [Article], now: DateTime<Utc>) {
    let window_start = (now - chrono::Duration::hours(72)).timestamp_millis();

    let mut ranked: Vec<(usize, u64)> = articles
        .iter()
        .enumerate()
        .filter(|(_, a)| a.timestamp >= window_start && a.views > 0)
        .map(|(i, a)| (i, a.views))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    for article in articles.iter_mut() {
        article.trending = false;
    }
    for (i, _) in ranked.into_iter().take(TRENDING_COUNT) {
        articles[i].trending = true;
    }
}

#[cfg(test)]
pub(crate) fn sample_article(id: &str, title: &str, category: &str) -> Article {
    Article {
        id: id.to_string(),
        slug: slugify(title),
        title: title.to_string(),
        full_content: format!("{title}\n\nSecond paragraph."),
        preview: format!("{title} preview"),
        category: category.to_string(),
        source: "Example Wire".to_string(),
        url: format!("https://example.com/{id}"),
        date: "January 1, 2026".to_string(),
        timestamp: Utc::now().timestamp_millis(),
        views: 0,
        trending: false,
        image: None,
    }
}
