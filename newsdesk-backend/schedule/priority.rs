use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::SourceConfig;

const BBC_WORLD: &str = "https://feeds.bbci.co.uk/news/world/rss.xml";
const BBC_BUSINESS: &str = "https://feeds.bbci.co.uk/news/business/rss.xml";
const BBC_POLITICS: &str = "https://feeds.bbci.co.uk/news/politics/rss.xml";
const BBC_SCIENCE: &str = "https://feeds.bbci.co.uk/news/science_and_environment/rss.xml";
const BBC_HEALTH: &str = "https://feeds.bbci.co.uk/news/health/rss.xml";
const BBC_ENTERTAINMENT: &str = "https://feeds.bbci.co.uk/news/entertainment_and_arts/rss.xml";
const BBC_SPORT: &str = "https://feeds.bbci.co.uk/sport/rss.xml";
const NPR_NEWS: &str = "https://feeds.npr.org/1001/rss.xml";
const TECHCRUNCH: &str = "https://techcrunch.com/feed/";
const THE_VERGE: &str = "https://www.theverge.com/rss/index.xml";

/// A contiguous range of site-local hours sharing a source set and an
/// article count. `end_hour` is inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityBucket {
    pub name: String,
    pub start_hour: u32,
    pub end_hour: u32,
    pub articles: u32,
    pub sources: Vec<SourceConfig>,
}

impl PriorityBucket {
    pub fn contains(&self, hour: u32) -> bool {
        (self.start_hour..=self.end_hour).contains(&hour)
    }

    pub fn hours_label(&self) -> String {
        format!("{:02}:00-{:02}:59", self.start_hour, self.end_hour)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityTable {
    pub buckets: Vec<PriorityBucket>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        let bucket = |name: &str, start: u32, end: u32, articles: u32, sources: Vec<SourceConfig>| {
            PriorityBucket {
                name: name.to_string(),
                start_hour: start,
                end_hour: end,
                articles,
                sources,
            }
        };

        Self {
            buckets: vec![
                bucket(
                    "overnight",
                    0,
                    5,
                    1,
                    vec![
                        SourceConfig::rss("BBC World", BBC_WORLD, "world"),
                        SourceConfig::reddit("worldnews", "world"),
                    ],
                ),
                bucket(
                    "morning",
                    6,
                    9,
                    3,
                    vec![
                        SourceConfig::rss("BBC World", BBC_WORLD, "world"),
                        SourceConfig::rss("BBC Politics", BBC_POLITICS, "politics"),
                        SourceConfig::rss("BBC Business", BBC_BUSINESS, "business"),
                        SourceConfig::rss("NPR", NPR_NEWS, "world"),
                    ],
                ),
                bucket(
                    "midday",
                    10,
                    13,
                    2,
                    vec![
                        SourceConfig::rss("TechCrunch", TECHCRUNCH, "technology"),
                        SourceConfig::rss("The Verge", THE_VERGE, "technology"),
                        SourceConfig::hacker_news(),
                        SourceConfig::reddit("technology", "technology"),
                    ],
                ),
                bucket(
                    "afternoon",
                    14,
                    17,
                    2,
                    vec![
                        SourceConfig::rss("BBC Science", BBC_SCIENCE, "science"),
                        SourceConfig::rss("BBC Health", BBC_HEALTH, "health"),
                        SourceConfig::rss("BBC Business", BBC_BUSINESS, "business"),
                    ],
                ),
                bucket(
                    "evening",
                    18,
                    21,
                    2,
                    vec![
                        SourceConfig::rss("BBC Sport", BBC_SPORT, "sports"),
                        SourceConfig::rss("BBC Entertainment", BBC_ENTERTAINMENT, "entertainment"),
                        SourceConfig::reddit("worldnews", "world"),
                    ],
                ),
                bucket(
                    "late",
                    22,
                    23,
                    1,
                    vec![
                        SourceConfig::rss("BBC World", BBC_WORLD, "world"),
                        SourceConfig::hacker_news(),
                    ],
                ),
            ],
        }
    }
}

impl PriorityTable {
    pub fn bucket_for_hour(&self, hour: u32) -> Option<&PriorityBucket> {
        self.buckets.iter().find(|b| b.contains(hour % 24))
    }

    pub fn by_name(&self, name: &str) -> Option<&PriorityBucket> {
        self.buckets
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let table: PriorityTable =
            serde_yaml::from_str(text).context("failed to parse priority table")?;
        table.validate()?;
        Ok(table)
    }

    /// Read an override file, falling back to the built-in table when no
    /// path is configured.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read priority file {}", path.display()))?;
        let table = Self::from_yaml(&text)?;
        tracing::info!(path = %path.display(), buckets = table.buckets.len(), "Loaded priority table");
        Ok(table)
    }

    /// Every source must feed a category the site lists.
    pub fn check_categories(&self, site_categories: &[String]) -> Result<()> {
        for bucket in &self.buckets {
            for source in &bucket.sources {
                let category = source.category();
                if !site_categories.iter().any(|c| c == category) {
                    anyhow::bail!(
                        "source '{}' in bucket '{}' uses category '{category}', which the site does not list",
                        source.label(),
                        bucket.name
                    );
                }
            }
        }
        Ok(())
    }

    /// Every hour 0-23 must belong to exactly one bucket.
    fn validate(&self) -> Result<()> {
        let mut owner: [Option<&str>; 24] = [None; 24];
        for bucket in &self.buckets {
            if bucket.name.trim().is_empty() {
                anyhow::bail!("priority bucket with empty name");
            }
            if bucket.start_hour > bucket.end_hour || bucket.end_hour > 23 {
                anyhow::bail!(
                    "bucket '{}' has invalid hours {}-{}",
                    bucket.name,
                    bucket.start_hour,
                    bucket.end_hour
                );
            }
            if bucket.sources.is_empty() {
                anyhow::bail!("bucket '{}' has no sources", bucket.name);
            }
            for hour in bucket.start_hour..=bucket.end_hour {
                if let Some(other) = owner[hour as usize] {
                    anyhow::bail!(
                        "hour {hour} is covered by both '{other}' and '{}'",
                        bucket.name
                    );
                }
                owner[hour as usize] = Some(bucket.name.as_str());
            }
        }
        if let Some(hour) = owner.iter().position(Option::is_none) {
            anyhow::bail!("hour {hour} is not covered by any bucket");
        }
        Ok(())
    }
}
