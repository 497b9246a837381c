use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::Sink;
use crate::telegram::client::TelegramApi;

/// Posts run summaries to every admin chat.
pub struct TelegramSink {
    api: Arc<dyn TelegramApi>,
    chat_ids: Vec<i64>,
}

impl TelegramSink {
    pub fn new(api: Arc<dyn TelegramApi>, chat_ids: Vec<i64>) -> Self {
        Self { api, chat_ids }
    }
}

#[async_trait]
impl Sink for TelegramSink {
    async fn deliver(&self, text: &str) -> Result<()> {
        let mut failures = Vec::new();
        for chat_id in &self.chat_ids {
            if let Err(e) = self.api.send_message(*chat_id, text, None).await {
                tracing::warn!(chat_id, error = %e, "Failed to notify admin chat");
                failures.push(format!("{chat_id}: {e}"));
            }
        }

        if !failures.is_empty() && failures.len() == self.chat_ids.len() {
            anyhow::bail!("no admin chat could be notified: {}", failures.join("; "));
        }
        tracing::info!(chats = self.chat_ids.len() - failures.len(), "Delivered message to Telegram");
        Ok(())
    }
}
