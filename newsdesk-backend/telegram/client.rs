use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

use super::models::InlineKeyboardMarkup;

const TELEGRAM_API: &str = "https://api.telegram.org";
const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("Telegram API error: {0}")]
    Api(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode Telegram response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TelegramError {
    fn is_markdown_error(&self) -> bool {
        matches!(self, TelegramError::Api(d) if d.contains("can't parse entities"))
    }

    fn is_not_modified(&self) -> bool {
        matches!(self, TelegramError::Api(d) if d.contains("message is not modified"))
    }
}

#[async_trait]
pub trait TelegramApi: Send + Sync {
    /// Returns the id of the sent message.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, TelegramError>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError>;

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TelegramError>;

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), TelegramError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

pub struct HttpTelegramClient {
    client: reqwest::Client,
    token: String,
}

impl HttpTelegramClient {
    pub fn new(client: reqwest::Client, token: String) -> Self {
        Self { client, token }
    }

    async fn call(&self, method: &str, payload: &Value) -> Result<Value, TelegramError> {
        let url = format!("{TELEGRAM_API}/bot{}/{method}", self.token);
        // Telegram reports failures as {"ok": false} with a 4xx status, so
        // the envelope is read regardless of status.
        let text = self.client.post(&url).json(payload).send().await?.text().await?;
        parse_envelope(&text)
    }
}

fn parse_envelope(text: &str) -> Result<Value, TelegramError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    if !envelope.ok {
        return Err(TelegramError::Api(
            envelope
                .description
                .unwrap_or_else(|| "unknown error".to_string()),
        ));
    }
    Ok(envelope.result.unwrap_or(Value::Null))
}

/// Cut text to Telegram's message limit on a char boundary.
pub fn clamp_message(text: &str) -> &str {
    if text.len() <= MAX_MESSAGE_LEN {
        return text;
    }
    let mut end = MAX_MESSAGE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub fn message_payload(
    chat_id: i64,
    text: &str,
    keyboard: Option<&InlineKeyboardMarkup>,
    markdown: bool,
) -> Value {
    let mut payload = json!({
        "chat_id": chat_id,
        "text": clamp_message(text),
        "disable_web_page_preview": true,
    });
    if markdown {
        payload["parse_mode"] = json!("Markdown");
    }
    if let Some(kb) = keyboard {
        payload["reply_markup"] = json!(kb);
    }
    payload
}

#[async_trait]
impl TelegramApi for HttpTelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, TelegramError> {
        let result = match self
            .call("sendMessage", &message_payload(chat_id, text, keyboard, true))
            .await
        {
            Err(e) if e.is_markdown_error() => {
                tracing::warn!(chat_id, "Markdown rejected, resending as plain text");
                self.call("sendMessage", &message_payload(chat_id, text, keyboard, false))
                    .await?
            }
            other => other?,
        };
        Ok(result["message_id"].as_i64().unwrap_or_default())
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), TelegramError> {
        let mut payload = message_payload(chat_id, text, keyboard, true);
        payload["message_id"] = json!(message_id);

        match self.call("editMessageText", &payload).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_modified() => Ok(()),
            Err(e) if e.is_markdown_error() => {
                let mut plain = message_payload(chat_id, text, keyboard, false);
                plain["message_id"] = json!(message_id);
                self.call("editMessageText", &plain).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TelegramError> {
        let mut payload = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            payload["text"] = json!(text);
        }
        self.call("answerCallbackQuery", &payload).await.map(|_| ())
    }

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<(), TelegramError> {
        self.call(
            "sendChatAction",
            &json!({ "chat_id": chat_id, "action": action }),
        )
        .await
        .map(|_| ())
    }
}
