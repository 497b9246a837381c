use chrono::{DateTime, FixedOffset, Utc};

use super::models::{InlineKeyboardButton, InlineKeyboardMarkup};
use crate::models::{Article, CronLog, RunStatus, SiteConfig, Stats};
use crate::schedule::{Budget, PriorityBucket, PriorityTable};

/// Escape the characters legacy Markdown treats as markup.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '[' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Text for `[text](url)`. Legacy Markdown shows escapes there literally,
/// so brackets are dropped instead.
pub fn link_text(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '[' | ']')).collect()
}

/// Inline code span; legacy Markdown has no way to escape a backtick inside one.
pub fn code_span(text: &str) -> String {
    format!("`{}`", text.replace('`', ""))
}

pub fn help_text(is_admin: bool) -> String {
    let mut text = String::from("*Newsdesk bot*\n\n/start - welcome\n/help - this message\n");
    if is_admin {
        text.push_str(
            "\n*Publishing*\n\
             /fetch \\[n] - publish n articles now\n\
             /pause - stop automatic publishing\n\
             /resume - restart automatic publishing\n\
             /priority - hourly source buckets\n\
             /cronlogs - recent runs\n\
             \n*Articles*\n\
             /articles \\[n] - latest articles\n\
             /article <id> - article details\n\
             /delete <id> - remove an article\n\
             /clear - remove all articles\n\
             \n*Monitoring*\n\
             /status - system status\n\
             /stats - traffic and publishing counters\n\
             /analytics - traffic breakdown\n\
             /budget - daily limits\n\
             /setlimit <n> - daily article limit\n\
             /setbudget <usd> - daily spend limit\n\
             /config - site configuration\n\
             /testai - check the AI connection\n",
        );
    } else {
        text.push_str("\nAdmin commands are restricted.\n");
    }
    text
}

pub fn main_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("Fetch 1", "fetch:1"),
            InlineKeyboardButton::callback("Fetch 3", "fetch:3"),
        ],
        vec![
            InlineKeyboardButton::callback("Status", "status"),
            InlineKeyboardButton::callback("Stats", "stats"),
        ],
    ])
}

pub fn clear_confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("Yes, delete all", "clear:confirm"),
        InlineKeyboardButton::callback("Cancel", "clear:cancel"),
    ]])
}

pub fn article_keyboard(article: &Article, site: &SiteConfig) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::link("Open", &site.absolute_url(&article.canonical_path())),
        InlineKeyboardButton::callback("Delete", &format!("delete:{}", article.id)),
    ]])
}

/// Everything `/status` shows, gathered by the handler.
pub struct StatusInfo<'a> {
    pub site: &'a SiteConfig,
    pub stats: &'a Stats,
    pub articles: usize,
    pub scheduler_running: bool,
    pub next_run: Option<DateTime<Utc>>,
    pub pipeline_running: bool,
    pub bucket: Option<&'a PriorityBucket>,
    pub ai_configured: bool,
    pub last_run: Option<&'a CronLog>,
    pub offset: FixedOffset,
}

pub fn status_message(info: &StatusInfo<'_>) -> String {
    let strategy = &info.site.strategy;
    let mut out = format!("*{} status*\n\n", escape_markdown(&info.site.site_name));
    out.push_str(&format!(
        "Autopublish: {}\n",
        if strategy.autopublish { "on" } else { "paused" }
    ));
    out.push_str(&format!(
        "Scheduler: {}\n",
        if info.scheduler_running { "running" } else { "stopped" }
    ));
    if let Some(next) = info.next_run {
        out.push_str(&format!("Next run: {}\n", local_time(next, info.offset)));
    }
    if info.pipeline_running {
        out.push_str("A publishing run is in progress\n");
    }
    if let Some(bucket) = info.bucket {
        out.push_str(&format!(
            "Current bucket: {} ({}, {} per run)\n",
            escape_markdown(&bucket.name),
            bucket.hours_label(),
            bucket.articles
        ));
    }
    out.push_str(&format!(
        "AI: {}\n",
        if info.ai_configured { "configured" } else { "missing OPENAI\\_API\\_KEY" }
    ));
    out.push_str(&format!(
        "\nArticles stored: {}\nPublished today: {}/{}\n",
        info.articles, info.stats.daily_articles_published, strategy.daily_limit
    ));
    if let Some(log) = info.last_run {
        out.push_str(&format!(
            "Last run: {} ({} published, {})\n",
            local_time(log.started_at, info.offset),
            log.published,
            status_label(log.status)
        ));
    }
    out
}

pub fn stats_message(stats: &Stats, articles: &[Article]) -> String {
    let mut out = String::from("*Stats*\n\n");
    out.push_str(&format!("Total views: {}\n", stats.total_views));
    out.push_str(&format!("Articles stored: {}\n", articles.len()));
    out.push_str(&format!(
        "Published: {} today, {} all time\n",
        stats.daily_articles_published, stats.total_articles_published
    ));
    out.push_str(&format!(
        "Spend: ${:.2} today, ${:.2} all time\n",
        stats.daily_spend_usd, stats.total_spend_usd
    ));

    let mut top: Vec<&Article> = articles.iter().filter(|a| a.views > 0).collect();
    top.sort_by(|a, b| b.views.cmp(&a.views));
    if !top.is_empty() {
        out.push_str("\n*Most read*\n");
        for article in top.into_iter().take(5) {
            out.push_str(&format!(
                "• {} ({} views)\n",
                escape_markdown(&article.title),
                article.views
            ));
        }
    }
    out
}

pub fn analytics_message(stats: &Stats) -> String {
    let a = &stats.analytics;
    let mut out = String::from("*Analytics*\n");

    let section = |out: &mut String, title: &str, entries: Vec<(String, u64)>| {
        out.push_str(&format!("\n*{title}*\n"));
        if entries.is_empty() {
            out.push_str("no data yet\n");
        }
        for (key, count) in entries {
            out.push_str(&format!("• {}: {count}\n", escape_markdown(&key)));
        }
    };

    let mut recent_days: Vec<(String, u64)> =
        a.daily.iter().rev().take(7).map(|(k, v)| (k.clone(), *v)).collect();
    recent_days.reverse();
    section(&mut out, "Last 7 days", recent_days);
    section(&mut out, "Busiest hours", Stats::top(&a.hourly, 5));
    section(&mut out, "Referrers", Stats::top(&a.referrers, 5));
    section(&mut out, "Devices", Stats::top(&a.devices, 4));
    section(&mut out, "Countries", Stats::top(&a.countries, 5));
    out
}

pub fn budget_message(budget: &Budget, stats: &Stats) -> String {
    format!(
        "*Budget*\n\nArticles today: {}/{}\nSpend today: ${:.2}/${:.2}\nCost per article: ${:.2}\nRemaining today: {} articles",
        stats.daily_articles_published,
        budget.daily_limit,
        stats.daily_spend_usd,
        budget.daily_budget_usd,
        budget.cost_per_article_usd,
        budget.remaining(stats)
    )
}

pub fn articles_list(articles: &[Article], limit: usize) -> String {
    if articles.is_empty() {
        return "No articles yet. Use /fetch to publish some.".to_string();
    }
    let mut out = format!("*Latest {} of {} articles*\n\n", limit.min(articles.len()), articles.len());
    for article in articles.iter().take(limit) {
        out.push_str(&format!(
            "• {}{}\n  {} · {} · {} views\n",
            if article.trending { "🔥 " } else { "" },
            escape_markdown(&article.title),
            code_span(&article.id),
            escape_markdown(&article.category),
            article.views
        ));
    }
    out
}

pub fn article_detail(article: &Article, site: &SiteConfig) -> String {
    format!(
        "*{}*\n\n{}\n\nCategory: {}\nSource: {}\nPublished: {}\nViews: {}\nLink: {}",
        escape_markdown(&article.title),
        escape_markdown(&article.preview),
        escape_markdown(&article.category),
        escape_markdown(&article.source),
        escape_markdown(&article.date),
        article.views,
        site.absolute_url(&article.canonical_path())
    )
}

pub fn cron_logs_message(logs: &[CronLog], offset: FixedOffset) -> String {
    if logs.is_empty() {
        return "No runs recorded yet.".to_string();
    }
    let mut out = String::from("*Recent runs*\n\n");
    for log in logs.iter().take(10) {
        out.push_str(&format!(
            "{} {} · {} · {} · {}/{} in {}s\n",
            status_icon(log.status),
            local_time(log.started_at, offset),
            log.trigger.as_str(),
            escape_markdown(&log.bucket),
            log.published,
            log.requested,
            log.duration_secs()
        ));
        if let Some(note) = &log.note {
            out.push_str(&format!("   {}\n", escape_markdown(note)));
        }
        if let Some(error) = log.errors.first() {
            out.push_str(&format!("   {}\n", escape_markdown(error)));
        }
    }
    out
}

pub fn priority_message(table: &PriorityTable, current_hour: u32) -> String {
    let mut out = String::from("*Priority buckets*\n\n");
    for bucket in &table.buckets {
        let marker = if bucket.contains(current_hour) { "▶️ " } else { "" };
        let sources: Vec<String> = bucket.sources.iter().map(|s| s.label()).collect();
        out.push_str(&format!(
            "{marker}*{}* {} · {} per run\n   {}\n",
            escape_markdown(&bucket.name),
            bucket.hours_label(),
            bucket.articles,
            escape_markdown(&sources.join(", "))
        ));
    }
    out
}

pub fn config_message(site: &SiteConfig, model: &str, schedule: &str) -> String {
    let s = &site.strategy;
    format!(
        "*Configuration*\n\nSite: {}\nURL: {}\nCategories: {}\nModel: {}\nSchedule: {}\n\nArticles per run: {}\nDaily limit: {}\nDaily budget: ${:.2}\nCost per article: ${:.2}\nAutopublish: {}",
        escape_markdown(&site.site_name),
        site.base_url,
        escape_markdown(&site.categories.join(", ")),
        escape_markdown(model),
        code_span(schedule),
        s.articles_per_run,
        s.daily_limit,
        s.daily_budget_usd,
        s.cost_per_article_usd,
        s.autopublish
    )
}

fn local_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string()
}

fn status_icon(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "✅",
        RunStatus::Partial => "⚠️",
        RunStatus::Skipped => "⏭",
        RunStatus::Failed => "❌",
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Success => "success",
        RunStatus::Partial => "partial",
        RunStatus::Skipped => "skipped",
        RunStatus::Failed => "failed",
    }
}
