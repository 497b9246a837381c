use chrono::{DateTime, Utc};

use crate::models::{Stats, Strategy};

/// Daily publishing limits derived from the site strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    pub daily_limit: u32,
    pub daily_budget_usd: f64,
    pub cost_per_article_usd: f64,
}

impl Budget {
    pub fn from_strategy(strategy: &Strategy) -> Self {
        Self {
            daily_limit: strategy.daily_limit,
            daily_budget_usd: strategy.daily_budget_usd,
            cost_per_article_usd: strategy.cost_per_article_usd,
        }
    }

    /// Articles that may still be published today. Assumes `stats` has
    /// already been rolled over to the current day.
    pub fn remaining(&self, stats: &Stats) -> u32 {
        let by_count = self
            .daily_limit
            .saturating_sub(stats.daily_articles_published);

        if self.cost_per_article_usd <= 0.0 {
            return by_count;
        }
        let money_left = (self.daily_budget_usd - stats.daily_spend_usd).max(0.0);
        // small epsilon so 0.15 / 0.05 is 3, not 2.9999
        let by_spend = ((money_left / self.cost_per_article_usd) + 1e-9).floor() as u32;
        by_count.min(by_spend)
    }

    pub fn record_publish(&self, stats: &mut Stats, published: u32, now: DateTime<Utc>) {
        if published == 0 {
            return;
        }
        let cost = published as f64 * self.cost_per_article_usd;
        stats.daily_articles_published += published;
        stats.total_articles_published += published as u64;
        stats.daily_spend_usd += cost;
        stats.total_spend_usd += cost;
        stats.last_fetch = Some(now);
    }
}
