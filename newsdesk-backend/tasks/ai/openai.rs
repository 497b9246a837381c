use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::prompts::{SYSTEM_PROMPT, parse_generated, user_prompt};
use super::{AiError, ArticleWriter, GeneratedArticle, ImageGenerator, RetryPolicy};
use crate::config::OpenAiSettings;
use crate::tasks::sources::SourceItem;

const REWRITE_MAX_TOKENS: u32 = 1200;
const IMAGE_SIZE: &str = "1792x1024";

/// Client for an OpenAI-compatible API. Handles both chat completions and
/// image generation.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    image_model: String,
    image_generation: bool,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

impl OpenAiClient {
    pub fn new(client: reqwest::Client, settings: &OpenAiSettings) -> Self {
        Self {
            client,
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            image_model: settings.image_model.clone(),
            image_generation: settings.image_generation,
            retry: RetryPolicy::new(settings.timeout),
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn images_enabled(&self) -> bool {
        self.image_generation && self.api_key.is_some()
    }

    fn key(&self) -> Result<&str, AiError> {
        self.api_key.as_deref().ok_or(AiError::MissingKey)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, AiError> {
        let key = self.key()?;
        let resp = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        Ok(resp)
    }

    async fn chat(&self, body: &Value) -> Result<String, AiError> {
        let resp: ChatResponse = self.post("chat/completions", body).await?.json().await?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AiError::InvalidResponse("empty completion".to_string()))
    }
}

pub fn chat_body(model: &str, system: &str, user: &str, max_tokens: u32, json_mode: bool) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [
            {"role": "system", "content": system},
            {"role": "user", "content": user},
        ],
        "temperature": 0.7,
        "max_tokens": max_tokens,
    });
    if json_mode {
        body["response_format"] = json!({"type": "json_object"});
    }
    body
}

pub fn image_body(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "prompt": prompt,
        "n": 1,
        "size": IMAGE_SIZE,
    })
}

#[async_trait]
impl ArticleWriter for OpenAiClient {
    async fn rewrite(
        &self,
        item: &SourceItem,
        categories: &[String],
    ) -> Result<GeneratedArticle, AiError> {
        self.key()?;
        let body = chat_body(
            &self.model,
            SYSTEM_PROMPT,
            &user_prompt(item, categories),
            REWRITE_MAX_TOKENS,
            true,
        );
        let reply = self.retry.run("rewrite", || self.chat(&body)).await?;
        parse_generated(&reply, item, categories)
    }

    async fn ping(&self) -> Result<String, AiError> {
        self.key()?;
        let body = chat_body(
            &self.model,
            "You are a health check.",
            "Reply with the single word: pong",
            5,
            false,
        );
        RetryPolicy::no_retry(self.retry.timeout)
            .run("ping", || self.chat(&body))
            .await
            .map(|reply| reply.trim().to_string())
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AiError> {
        if !self.image_generation {
            return Err(AiError::Disabled);
        }
        self.key()?;
        let body = image_body(&self.image_model, prompt);
        let body = &body;
        self.retry
            .run("image", || async move {
                let resp: ImageResponse = self.post("images/generations", body).await?.json().await?;
                resp.data
                    .into_iter()
                    .find_map(|d| d.url)
                    .ok_or_else(|| AiError::InvalidResponse("no image url".to_string()))
            })
            .await
    }
}
