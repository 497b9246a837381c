use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "world",
    "politics",
    "business",
    "technology",
    "science",
    "health",
    "sports",
    "entertainment",
];

/// Site theming and publishing strategy, read on every page render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteConfig {
    pub site_name: String,
    pub tagline: String,
    pub description: String,
    pub base_url: String,
    pub contact_email: String,
    pub theme: Theme,
    pub categories: Vec<String>,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Theme {
    pub primary_color: String,
    pub accent_color: String,
    pub background_color: String,
    pub font_family: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Strategy {
    /// Upper bound on articles a single run may publish.
    pub articles_per_run: u32,
    pub daily_limit: u32,
    pub daily_budget_usd: f64,
    pub cost_per_article_usd: f64,
    pub autopublish: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            site_name: "Newsdesk".to_string(),
            tagline: "The day's stories, rewritten".to_string(),
            description: "Automatically curated news from around the web.".to_string(),
            base_url: "http://localhost:8081".to_string(),
            contact_email: "editor@example.com".to_string(),
            theme: Theme::default(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            strategy: Strategy::default(),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_color: "#1a1a2e".to_string(),
            accent_color: "#e94560".to_string(),
            background_color: "#f7f7f9".to_string(),
            font_family: "Georgia, 'Times New Roman', serif".to_string(),
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            articles_per_run: 3,
            daily_limit: 24,
            daily_budget_usd: 2.0,
            cost_per_article_usd: 0.05,
            autopublish: true,
        }
    }
}

impl SiteConfig {
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// First listed category among `candidates`, else the site's first
    /// category. Stored articles must always use a listed category or their
    /// canonical page 404s.
    pub fn pick_category(&self, candidates: &[&str]) -> String {
        if let Some(found) = candidates.iter().copied().find(|c| self.has_category(c)) {
            return found.to_string();
        }
        match self.categories.first() {
            Some(first) => first.clone(),
            None => candidates.last().map(|c| c.to_string()).unwrap_or_default(),
        }
    }

    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// Lowercase a model-provided category and map common synonyms onto the
/// site's category names.
pub fn normalize_category(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    match lowered.as_str() {
        "tech" | "ai" | "science & technology" => "technology".to_string(),
        "economy" | "finance" | "markets" => "business".to_string(),
        "sport" => "sports".to_string(),
        "culture" | "arts" | "celebrity" => "entertainment".to_string(),
        "international" | "global" => "world".to_string(),
        other => other
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect(),
    }
}
