use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use super::client::TelegramApi;
use super::commands::Command;
use super::format::{self, StatusInfo, code_span, escape_markdown};
use super::models::{CallbackQuery, Message, Update};
use crate::models::Trigger;
use crate::schedule::{Budget, PublishScheduler, site_date, site_hour};
use crate::store::SiteStore;
use crate::tasks::ai::ArticleWriter;
use crate::tasks::pipeline::PipelineError;

const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_LIST_LIMIT: usize = 30;

/// Answers bot updates. Held in an `Arc` so `/fetch` can run in a
/// spawned task.
pub struct BotService {
    store: Arc<SiteStore>,
    scheduler: Arc<PublishScheduler>,
    writer: Arc<dyn ArticleWriter>,
    api: Arc<dyn TelegramApi>,
    admins: Vec<i64>,
    model: String,
    ai_configured: bool,
}

impl BotService {
    pub fn new(
        store: Arc<SiteStore>,
        scheduler: Arc<PublishScheduler>,
        writer: Arc<dyn ArticleWriter>,
        api: Arc<dyn TelegramApi>,
        admins: Vec<i64>,
        model: String,
        ai_configured: bool,
    ) -> Self {
        Self {
            store,
            scheduler,
            writer,
            api,
            admins,
            model,
            ai_configured,
        }
    }

    pub fn is_admin(&self, chat_id: i64) -> bool {
        self.admins.contains(&chat_id)
    }

    #[tracing::instrument(skip_all, fields(update_id = update.update_id))]
    pub async fn handle_update(self: &Arc<Self>, update: Update) {
        if let Some(callback) = update.callback_query {
            self.handle_callback(callback).await;
            return;
        }

        // Edits of old commands must not run them again.
        let Some(message) = update.message else {
            tracing::debug!(edited = update.edited_message.is_some(), "Ignoring update without new message");
            return;
        };
        let chat_id = message.chat.id;
        if let Err(e) = self.handle_message(&message).await {
            tracing::error!(chat_id, error = %format!("{e:#}"), "Bot command failed");
            let text = format!("❌ Error: {}", escape_markdown(&format!("{e:#}")));
            if let Err(e) = self.api.send_message(chat_id, &text, None).await {
                tracing::warn!(chat_id, error = %e, "Failed to report error to chat");
            }
        }
    }

    async fn handle_message(self: &Arc<Self>, message: &Message) -> Result<()> {
        let chat_id = message.chat.id;
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let is_admin = self.is_admin(chat_id);

        let Some(command) = Command::parse(text) else {
            if is_admin {
                self.reply(chat_id, "Send /help for the list of commands.").await?;
            }
            return Ok(());
        };

        if !is_admin && !command.is_public() {
            tracing::warn!(chat_id, ?command, "Rejected command from non-admin chat");
            self.reply(chat_id, "⛔ This command is restricted to site admins.")
                .await?;
            return Ok(());
        }

        tracing::info!(chat_id, ?command, "Handling bot command");
        self.run_command(chat_id, command, is_admin).await
    }

    async fn run_command(self: &Arc<Self>, chat_id: i64, command: Command, is_admin: bool) -> Result<()> {
        match command {
            Command::Start => {
                let site = self.store.site_config().await?;
                let mut text = format!(
                    "👋 Welcome to *{}*.\n\n",
                    escape_markdown(&site.site_name)
                );
                if is_admin {
                    text.push_str("You are an admin. Use the buttons below or /help.");
                    self.api
                        .send_message(chat_id, &text, Some(&format::main_keyboard()))
                        .await?;
                } else {
                    text.push_str(&format!("Read the latest stories at {}", site.base_url));
                    self.reply(chat_id, &text).await?;
                }
            }
            Command::Help => self.reply(chat_id, &format::help_text(is_admin)).await?,
            Command::Status => self.reply(chat_id, &self.status_text().await?).await?,
            Command::Stats => {
                let stats = self.store.stats().await?;
                let articles = self.store.articles().await?;
                self.reply(chat_id, &format::stats_message(&stats, &articles))
                    .await?;
            }
            Command::Analytics => {
                let stats = self.store.stats().await?;
                self.reply(chat_id, &format::analytics_message(&stats)).await?;
            }
            Command::Fetch(count) => self.start_fetch(chat_id, count).await?,
            Command::Articles(limit) => {
                let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
                let articles = self.store.articles().await?;
                self.reply(chat_id, &format::articles_list(&articles, limit))
                    .await?;
            }
            Command::Article(None) => self.reply(chat_id, "Usage: /article <id>").await?,
            Command::Article(Some(id)) => match self.store.article(&id).await? {
                Some(article) => {
                    let site = self.store.site_config().await?;
                    self.api
                        .send_message(
                            chat_id,
                            &format::article_detail(&article, &site),
                            Some(&format::article_keyboard(&article, &site)),
                        )
                        .await?;
                }
                None => self.reply(chat_id, "Article not found.").await?,
            },
            Command::Delete(None) => self.reply(chat_id, "Usage: /delete <id>").await?,
            Command::Delete(Some(id)) => {
                let text = self.delete_text(&id).await?;
                self.reply(chat_id, &text).await?;
            }
            Command::Clear => {
                let count = self.store.articles().await?.len();
                self.api
                    .send_message(
                        chat_id,
                        &format!("Delete all {count} articles? This cannot be undone."),
                        Some(&format::clear_confirm_keyboard()),
                    )
                    .await?;
            }
            Command::Budget => self.reply(chat_id, &self.budget_text().await?).await?,
            Command::SetLimit(None) => self.reply(chat_id, "Usage: /setlimit <articles per day>").await?,
            Command::SetLimit(Some(limit)) => {
                self.store
                    .update_site_config(|c| c.strategy.daily_limit = limit)
                    .await?;
                tracing::info!(limit, "Daily limit updated");
                self.reply(chat_id, &format!("✅ Daily limit set to {limit} articles."))
                    .await?;
            }
            Command::SetBudget(None) => self.reply(chat_id, "Usage: /setbudget <usd>").await?,
            Command::SetBudget(Some(usd)) => {
                self.store
                    .update_site_config(|c| c.strategy.daily_budget_usd = usd)
                    .await?;
                tracing::info!(usd, "Daily budget updated");
                self.reply(chat_id, &format!("✅ Daily budget set to ${usd:.2}."))
                    .await?;
            }
            Command::Pause => {
                self.set_autopublish(false).await?;
                self.reply(chat_id, "⏸ Automatic publishing paused. /resume to restart.")
                    .await?;
            }
            Command::Resume => {
                self.set_autopublish(true).await?;
                self.reply(chat_id, "▶️ Automatic publishing resumed.").await?;
            }
            Command::Priority => {
                let hour = site_hour(Utc::now(), self.scheduler.offset());
                self.reply(
                    chat_id,
                    &format::priority_message(self.scheduler.priority(), hour),
                )
                .await?;
            }
            Command::CronLogs => {
                let logs = self.store.cron_logs().await?;
                self.reply(
                    chat_id,
                    &format::cron_logs_message(&logs, self.scheduler.offset()),
                )
                .await?;
            }
            Command::Config => {
                let site = self.store.site_config().await?;
                self.reply(
                    chat_id,
                    &format::config_message(&site, &self.model, self.scheduler.schedule()),
                )
                .await?;
            }
            Command::TestAi => {
                if let Err(e) = self.api.send_chat_action(chat_id, "typing").await {
                    tracing::debug!(error = %e, "Failed to send chat action");
                }
                let text = match self.writer.ping().await {
                    Ok(reply) => format!(
                        "✅ AI reachable ({}): {}",
                        escape_markdown(&self.model),
                        escape_markdown(&reply)
                    ),
                    Err(e) => format!("❌ AI check failed: {}", escape_markdown(&e.to_string())),
                };
                self.reply(chat_id, &text).await?;
            }
            Command::Unknown(name) => {
                let text = format!(
                    "Unknown command /{}\n\n{}",
                    escape_markdown(&name),
                    format::help_text(is_admin)
                );
                self.reply(chat_id, &text).await?;
            }
        }
        Ok(())
    }

    async fn handle_callback(self: &Arc<Self>, callback: CallbackQuery) {
        let chat_id = callback
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(callback.from.id);
        let data = callback.data.as_deref().unwrap_or_default();

        let answer = if !self.is_admin(chat_id) {
            tracing::warn!(chat_id, data, "Rejected callback from non-admin chat");
            Some("Not allowed".to_string())
        } else {
            match self.run_callback(chat_id, &callback, data).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::error!(chat_id, data, error = %format!("{e:#}"), "Callback failed");
                    Some("Something went wrong".to_string())
                }
            }
        };

        if let Err(e) = self
            .api
            .answer_callback_query(&callback.id, answer.as_deref())
            .await
        {
            tracing::warn!(error = %e, "Failed to answer callback query");
        }
    }

    /// Returns the short toast shown to the admin, if any.
    async fn run_callback(
        self: &Arc<Self>,
        chat_id: i64,
        callback: &CallbackQuery,
        data: &str,
    ) -> Result<Option<String>> {
        let message_id = callback.message.as_ref().map(|m| m.message_id);
        let (action, arg) = data.split_once(':').unwrap_or((data, ""));

        match action {
            "fetch" => {
                let count = arg.parse().ok();
                self.start_fetch(chat_id, count).await?;
                Ok(Some("Fetching...".to_string()))
            }
            "status" => {
                self.reply(chat_id, &self.status_text().await?).await?;
                Ok(None)
            }
            "stats" => {
                let stats = self.store.stats().await?;
                let articles = self.store.articles().await?;
                self.reply(chat_id, &format::stats_message(&stats, &articles))
                    .await?;
                Ok(None)
            }
            "clear" if arg == "confirm" => {
                let removed = self.store.clear_articles().await?;
                tracing::info!(removed, "Cleared all articles");
                self.edit_or_reply(chat_id, message_id, &format!("🗑 Deleted {removed} articles."))
                    .await?;
                Ok(Some("Cleared".to_string()))
            }
            "clear" => {
                self.edit_or_reply(chat_id, message_id, "Cancelled, nothing was deleted.")
                    .await?;
                Ok(Some("Cancelled".to_string()))
            }
            "delete" if !arg.is_empty() => {
                let text = self.delete_text(arg).await?;
                self.edit_or_reply(chat_id, message_id, &text).await?;
                Ok(None)
            }
            _ => {
                tracing::warn!(data, "Unknown callback data");
                Ok(Some("Unknown action".to_string()))
            }
        }
    }

    /// Post a progress message and run the pipeline in the background,
    /// editing the message with the outcome.
    async fn start_fetch(self: &Arc<Self>, chat_id: i64, count: Option<u32>) -> Result<()> {
        if self.scheduler.pipeline().is_running() {
            self.reply(chat_id, "⏳ A publishing run is already in progress.")
                .await?;
            return Ok(());
        }

        let label = count.map_or_else(|| "the current bucket's".to_string(), |n| n.to_string());
        let message_id = self
            .api
            .send_message(chat_id, &format!("⏳ Fetching {label} articles..."), None)
            .await?;

        let bot = Arc::clone(self);
        tokio::spawn(async move {
            let text = bot.fetch_report(count).await;
            if let Err(e) = bot
                .api
                .edit_message_text(chat_id, message_id, &text, None)
                .await
            {
                tracing::warn!(chat_id, error = %e, "Failed to edit progress message, sending instead");
                if let Err(e) = bot.api.send_message(chat_id, &text, None).await {
                    tracing::error!(chat_id, error = %e, "Failed to deliver fetch result");
                }
            }
        });
        Ok(())
    }

    async fn fetch_report(&self, count: Option<u32>) -> String {
        let result = self
            .scheduler
            .run_now(Trigger::Manual, None, count, Utc::now())
            .await;
        match result {
            Ok(report) => match self.store.site_config().await {
                Ok(site) => report.summary(&site),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read site config for summary");
                    format!("Published {} articles.", report.published.len())
                }
            },
            Err(e) => match e.downcast_ref::<PipelineError>() {
                Some(PipelineError::AlreadyRunning) => {
                    "⏳ A publishing run is already in progress.".to_string()
                }
                _ => {
                    tracing::error!(error = %format!("{e:#}"), "Manual fetch failed");
                    format!("❌ Fetch failed: {}", escape_markdown(&format!("{e:#}")))
                }
            },
        }
    }

    async fn status_text(&self) -> Result<String> {
        let now = Utc::now();
        let site = self.store.site_config().await?;
        let mut stats = self.store.stats().await?;
        stats.roll_over(site_date(now, self.scheduler.offset()));
        let articles = self.store.articles().await?.len();
        let logs = self.store.cron_logs().await?;

        let info = StatusInfo {
            site: &site,
            stats: &stats,
            articles,
            scheduler_running: self.scheduler.is_running().await,
            next_run: self.scheduler.next_run(),
            pipeline_running: self.scheduler.pipeline().is_running(),
            bucket: self.scheduler.current_bucket(now),
            ai_configured: self.ai_configured,
            last_run: logs.first(),
            offset: self.scheduler.offset(),
        };
        Ok(format::status_message(&info))
    }

    async fn budget_text(&self) -> Result<String> {
        let site = self.store.site_config().await?;
        let mut stats = self.store.stats().await?;
        stats.roll_over(site_date(Utc::now(), self.scheduler.offset()));
        Ok(format::budget_message(
            &Budget::from_strategy(&site.strategy),
            &stats,
        ))
    }

    async fn delete_text(&self, id: &str) -> Result<String> {
        let deleted = self
            .store
            .delete_article(id)
            .await
            .with_context(|| format!("failed to delete article {id}"))?;
        Ok(if deleted {
            tracing::info!(id, "Deleted article");
            format!("🗑 Deleted article {}.", code_span(id))
        } else {
            format!("No article with id {}.", code_span(id))
        })
    }

    async fn set_autopublish(&self, enabled: bool) -> Result<()> {
        self.store
            .update_site_config(|c| c.strategy.autopublish = enabled)
            .await?;
        tracing::info!(enabled, "Autopublish toggled");
        Ok(())
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.api.send_message(chat_id, text, None).await?;
        Ok(())
    }

    async fn edit_or_reply(&self, chat_id: i64, message_id: Option<i64>, text: &str) -> Result<()> {
        match message_id {
            Some(message_id) => {
                self.api
                    .edit_message_text(chat_id, message_id, text, None)
                    .await?
            }
            None => self.reply(chat_id, text).await?,
        }
        Ok(())
    }
}
