use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Site counters. Every field defaults so older blobs keep loading as the
/// schema grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub total_views: u64,
    pub total_articles_published: u64,
    pub daily_articles_published: u32,
    pub last_reset: Option<NaiveDate>,
    pub daily_spend_usd: f64,
    pub total_spend_usd: f64,
    pub last_fetch: Option<DateTime<Utc>>,
    pub article_views: BTreeMap<String, u64>,
    pub analytics: Analytics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Analytics {
    pub daily: BTreeMap<String, u64>,
    pub hourly: BTreeMap<String, u64>,
    pub referrers: BTreeMap<String, u64>,
    pub devices: BTreeMap<String, u64>,
    pub countries: BTreeMap<String, u64>,
}

/// One page view as seen by the HTTP layer.
#[derive(Debug, Clone)]
pub struct PageView<'a> {
    pub article_id: Option<&'a str>,
    pub day: String,
    pub hour: u32,
    pub referrer: Option<&'a str>,
    pub device: DeviceClass,
    pub country: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
    Bot,
}

impl DeviceClass {
    pub fn from_user_agent(ua: &str) -> Self {
        let ua = ua.to_lowercase();
        if ua.is_empty()
            || ["bot", "crawler", "spider", "slurp", "curl", "wget", "facebookexternalhit"]
                .iter()
                .any(|m| ua.contains(m))
        {
            DeviceClass::Bot
        } else if ua.contains("ipad") || ua.contains("tablet") {
            DeviceClass::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Desktop => "desktop",
            DeviceClass::Bot => "bot",
        }
    }
}

/// Reduce a Referer header to its host, `direct` when absent.
pub fn referrer_host(referrer: Option<&str>) -> String {
    let Some(raw) = referrer.map(str::trim).filter(|r| !r.is_empty()) else {
        return "direct".to_string();
    };
    let without_scheme = raw.split_once("://").map(|(_, rest)| rest).unwrap_or(raw);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_start_matches("www.");
    if host.is_empty() {
        "direct".to_string()
    } else {
        host.to_lowercase()
    }
}

impl Stats {
    /// Reset the daily counters when the stored day is not `today`.
    /// Returns true when a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.last_reset == Some(today) {
            return false;
        }
        self.daily_articles_published = 0;
        self.daily_spend_usd = 0.0;
        self.last_reset = Some(today);
        true
    }

    /// Align the daily counter with the number of articles actually stored
    /// for today. Returns the previous value when they disagreed.
    pub fn reconcile_daily(&mut self, observed_today: u32, cost_per_article: f64) -> Option<u32> {
        if self.daily_articles_published == observed_today {
            return None;
        }
        let previous = self.daily_articles_published;
        self.daily_articles_published = observed_today;
        self.daily_spend_usd = observed_today as f64 * cost_per_article;
        Some(previous)
    }

    pub fn record_view(&mut self, view: &PageView<'_>) {
        let a = &mut self.analytics;
        *a.daily.entry(view.day.clone()).or_default() += 1;
        *a.hourly.entry(format!("{:02}", view.hour)).or_default() += 1;
        *a.referrers.entry(referrer_host(view.referrer)).or_default() += 1;
        *a.devices.entry(view.device.as_str().to_string()).or_default() += 1;
        let country = view
            .country
            .filter(|c| !c.is_empty() && *c != "XX")
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| "unknown".to_string());
        *a.countries.entry(country).or_default() += 1;

        if view.device == DeviceClass::Bot {
            return;
        }
        self.total_views += 1;
        if let Some(id) = view.article_id {
            *self.article_views.entry(id.to_string()).or_default() += 1;
        }
    }

    pub fn forget_article(&mut self, id: &str) {
        self.article_views.remove(id);
    }

    /// Top `n` entries of a counter map, highest first.
    pub fn top(map: &BTreeMap<String, u64>, n: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> =
            map.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries.truncate(n);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn view<'a>(article_id: Option<&'a str>, device: DeviceClass) -> PageView<'a> {
        PageView {
            article_id,
            day: "2026-01-02".into(),
            hour: 7,
            referrer: Some("https://www.google.com/search?q=x"),
            device,
            country: Some("de"),
        }
    }

    #[test]
    fn test_old_blob_with_missing_fields_loads() {
        let stats: Stats = serde_json::from_str(r#"{"totalViews": 12}"#).unwrap();
        assert_eq!(stats.total_views, 12);
        assert!(stats.analytics.daily.is_empty());
        assert!(stats.last_reset.is_none());
    }

    #[test]
    fn test_roll_over_resets_once_per_day() {
        let mut stats = Stats {
            daily_articles_published: 7,
            daily_spend_usd: 0.35,
            last_reset: Some(day("2026-01-01")),
            ..Default::default()
        };
        assert!(stats.roll_over(day("2026-01-02")));
        assert_eq!(stats.daily_articles_published, 0);
        assert_eq!(stats.daily_spend_usd, 0.0);

        stats.daily_articles_published = 2;
        assert!(!stats.roll_over(day("2026-01-02")));
        assert_eq!(stats.daily_articles_published, 2);
    }

    #[test]
    fn test_reconcile_daily_mismatch() {
        let mut stats = Stats {
            daily_articles_published: 9,
            ..Default::default()
        };
        assert_eq!(stats.reconcile_daily(4, 0.05), Some(9));
        assert_eq!(stats.daily_articles_published, 4);
        assert!((stats.daily_spend_usd - 0.2).abs() < 1e-9);
        assert_eq!(stats.reconcile_daily(4, 0.05), None);
    }

    #[test]
    fn test_record_view_counts_analytics() {
        let mut stats = Stats::default();
        stats.record_view(&view(Some("abc"), DeviceClass::Mobile));
        stats.record_view(&view(Some("abc"), DeviceClass::Desktop));

        assert_eq!(stats.total_views, 2);
        assert_eq!(stats.article_views["abc"], 2);
        assert_eq!(stats.analytics.daily["2026-01-02"], 2);
        assert_eq!(stats.analytics.hourly["07"], 2);
        assert_eq!(stats.analytics.referrers["google.com"], 2);
        assert_eq!(stats.analytics.devices["mobile"], 1);
        assert_eq!(stats.analytics.countries["DE"], 2);
    }

    #[test]
    fn test_bot_views_not_counted_as_article_views() {
        let mut stats = Stats::default();
        stats.record_view(&view(Some("abc"), DeviceClass::Bot));
        assert_eq!(stats.total_views, 0);
        assert!(stats.article_views.is_empty());
        assert_eq!(stats.analytics.devices["bot"], 1);
    }

    #[test]
    fn test_device_class_from_user_agent() {
        let iphone = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";
        let ipad = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)";
        let mac = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) Safari/605.1.15";
        let google = "Mozilla/5.0 (compatible; Googlebot/2.1)";
        assert_eq!(DeviceClass::from_user_agent(iphone), DeviceClass::Mobile);
        assert_eq!(DeviceClass::from_user_agent(ipad), DeviceClass::Tablet);
        assert_eq!(DeviceClass::from_user_agent(mac), DeviceClass::Desktop);
        assert_eq!(DeviceClass::from_user_agent(google), DeviceClass::Bot);
        assert_eq!(DeviceClass::from_user_agent(""), DeviceClass::Bot);
    }

    #[test]
    fn test_referrer_host() {
        assert_eq!(referrer_host(None), "direct");
        assert_eq!(referrer_host(Some("")), "direct");
        assert_eq!(referrer_host(Some("https://t.co/abc")), "t.co");
        assert_eq!(referrer_host(Some("news.ycombinator.com")), "news.ycombinator.com");
    }

    #[test]
    fn test_top_sorts_by_count_then_key() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), 5);
        map.insert("a".to_string(), 5);
        map.insert("c".to_string(), 9);
        let top = Stats::top(&map, 2);
        assert_eq!(top, vec![("c".to_string(), 9), ("a".to_string(), 5)]);
    }
}
