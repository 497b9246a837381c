use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub sentry_dsn: Option<String>,
    pub environment: String,
    pub data_dir: PathBuf,
    pub site_url: String,
    pub site_name: String,
    pub utc_offset_hours: i32,
    pub telegram: TelegramSettings,
    pub openai: OpenAiSettings,
    pub cron_secret: Option<String>,
    pub cron_schedule: String,
    pub priority_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: Option<String>,
    pub admin_chat_ids: Vec<i64>,
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub image_model: String,
    pub image_generation: bool,
    pub timeout: Duration,
}

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_SCHEDULE: &str = "0 */2 * * *";

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a Config from a key lookup (as env vars would provide).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = get("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let data_dir = get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".newsdesk")
        });

        let utc_offset_hours = get("UTC_OFFSET_HOURS")
            .and_then(|v| v.parse::<i32>().ok())
            .filter(|h| (-12..=14).contains(h))
            .unwrap_or(0);

        let admin_chat_ids = get("TELEGRAM_ADMIN_CHAT_IDS")
            .map(|raw| parse_chat_ids(&raw))
            .unwrap_or_default();

        let timeout_secs = get("AI_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|s| *s > 0)
            .unwrap_or(60);

        let image_generation = get("IMAGE_GENERATION")
            .map(|v| !matches!(v.to_lowercase().as_str(), "0" | "false" | "off" | "no"))
            .unwrap_or(true);

        Config {
            port,
            sentry_dsn: get("SENTRY_DSN"),
            environment: get("ENVIRONMENT").unwrap_or_else(|| "local".to_string()),
            data_dir,
            site_url: get("SITE_URL")
                .unwrap_or_else(|| format!("http://localhost:{port}"))
                .trim_end_matches('/')
                .to_string(),
            site_name: get("SITE_NAME").unwrap_or_else(|| "Newsdesk".to_string()),
            utc_offset_hours,
            telegram: TelegramSettings {
                bot_token: get("TELEGRAM_BOT_TOKEN"),
                admin_chat_ids,
                webhook_secret: get("TELEGRAM_WEBHOOK_SECRET"),
            },
            openai: OpenAiSettings {
                api_key: get("OPENAI_API_KEY"),
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: get("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
                image_model: get("OPENAI_IMAGE_MODEL").unwrap_or_else(|| "dall-e-3".to_string()),
                image_generation,
                timeout: Duration::from_secs(timeout_secs),
            },
            cron_secret: get("CRON_SECRET"),
            cron_schedule: get("CRON_SCHEDULE").unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            priority_file: get("PRIORITY_FILE").map(PathBuf::from),
        }
    }

    pub fn site_offset(&self) -> FixedOffset {
        site_offset(self.utc_offset_hours)
    }
}

pub fn site_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

fn parse_chat_ids(raw: &str) -> Vec<i64> {
    raw.split([',', ' '])
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = %s, "Ignoring invalid admin chat id");
                None
            }
        })
        .collect()
}

// --- Source types used by the pipeline ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SourceConfig {
    Rss {
        name: String,
        url: String,
        category: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    Reddit {
        subreddit: String,
        category: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    HackerNews {
        #[serde(default = "default_hn_category")]
        category: String,
        #[serde(default = "default_limit")]
        limit: usize,
    },
}

fn default_limit() -> usize {
    10
}

fn default_hn_category() -> String {
    "technology".to_string()
}

impl SourceConfig {
    pub fn rss(name: &str, url: &str, category: &str) -> Self {
        SourceConfig::Rss {
            name: name.to_string(),
            url: url.to_string(),
            category: category.to_string(),
            limit: default_limit(),
        }
    }

    pub fn reddit(subreddit: &str, category: &str) -> Self {
        SourceConfig::Reddit {
            subreddit: subreddit.to_string(),
            category: category.to_string(),
            limit: default_limit(),
        }
    }

    pub fn hacker_news() -> Self {
        SourceConfig::HackerNews {
            category: default_hn_category(),
            limit: default_limit(),
        }
    }

    pub fn category(&self) -> &str {
        match self {
            SourceConfig::Rss { category, .. }
            | SourceConfig::Reddit { category, .. }
            | SourceConfig::HackerNews { category, .. } => category,
        }
    }

    pub fn label(&self) -> String {
        match self {
            SourceConfig::Rss { name, .. } => name.clone(),
            SourceConfig::Reddit { subreddit, .. } => format!("r/{subreddit}"),
            SourceConfig::HackerNews { .. } => "Hacker News".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.port, 8081);
        assert_eq!(config.environment, "local");
        assert_eq!(config.site_url, "http://localhost:8081");
        assert_eq!(config.cron_schedule, "0 */2 * * *");
        assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(config.openai.timeout, Duration::from_secs(60));
        assert!(config.openai.image_generation);
        assert!(config.telegram.bot_token.is_none());
        assert!(config.telegram.admin_chat_ids.is_empty());
        assert!(config.data_dir.ends_with(".newsdesk"));
    }

    #[test]
    fn test_config_invalid_port_uses_default() {
        let config = config_from(&[("PORT", "not-a-number")]);
        assert_eq!(config.port, 8081);
    }

    #[test]
    fn test_config_empty_values_are_none() {
        let config = config_from(&[("SENTRY_DSN", ""), ("OPENAI_API_KEY", "  ")]);
        assert!(config.sentry_dsn.is_none());
        assert!(config.openai.api_key.is_none());
    }

    #[test]
    fn test_config_admin_ids() {
        let config = config_from(&[("TELEGRAM_ADMIN_CHAT_IDS", "123, -100456,abc")]);
        assert_eq!(config.telegram.admin_chat_ids, vec![123, -100456]);
    }

    #[test]
    fn test_config_trims_trailing_slashes() {
        let config = config_from(&[
            ("SITE_URL", "https://news.example.com/"),
            ("OPENAI_BASE_URL", "http://localhost:11434/v1/"),
        ]);
        assert_eq!(config.site_url, "https://news.example.com");
        assert_eq!(config.openai.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn test_config_offset_bounds() {
        assert_eq!(config_from(&[("UTC_OFFSET_HOURS", "3")]).utc_offset_hours, 3);
        assert_eq!(config_from(&[("UTC_OFFSET_HOURS", "40")]).utc_offset_hours, 0);
        assert_eq!(
            config_from(&[("UTC_OFFSET_HOURS", "-5")]).site_offset(),
            FixedOffset::west_opt(5 * 3600).unwrap()
        );
    }

    #[test]
    fn test_image_generation_toggle() {
        assert!(!config_from(&[("IMAGE_GENERATION", "false")]).openai.image_generation);
        assert!(!config_from(&[("IMAGE_GENERATION", "0")]).openai.image_generation);
        assert!(config_from(&[("IMAGE_GENERATION", "yes")]).openai.image_generation);
    }

    #[test]
    fn test_source_config_yaml_tags() {
        let yaml = r#"
- type: rss
  name: BBC World
  url: https://feeds.bbci.co.uk/news/world/rss.xml
  category: world
- type: reddit
  subreddit: technology
  category: technology
  limit: 5
- type: hacker-news
"#;
        let sources: Vec<SourceConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].label(), "BBC World");
        assert_eq!(
            sources[1],
            SourceConfig::Reddit {
                subreddit: "technology".into(),
                category: "technology".into(),
                limit: 5
            }
        );
        assert_eq!(sources[2], SourceConfig::hacker_news());
    }
}
