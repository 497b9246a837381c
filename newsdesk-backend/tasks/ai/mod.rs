pub mod openai;
pub mod prompts;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::tasks::sources::SourceItem;

pub use openai::OpenAiClient;
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("OPENAI_API_KEY is not configured")]
    MissingKey,
    #[error("image generation is disabled")]
    Disabled,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AiError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            AiError::Timeout(_) | AiError::Transport(_) => true,
            AiError::Status { status, .. } => *status == 429 || *status >= 500,
            AiError::MissingKey | AiError::Disabled | AiError::InvalidResponse(_) => false,
        }
    }
}

/// Model output for one rewritten story.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedArticle {
    pub title: String,
    pub content: String,
    pub preview: String,
    pub category: String,
}

#[async_trait]
pub trait ArticleWriter: Send + Sync {
    async fn rewrite(
        &self,
        item: &SourceItem,
        categories: &[String],
    ) -> Result<GeneratedArticle, AiError>;

    /// Minimal round trip used to check credentials and connectivity.
    async fn ping(&self) -> Result<String, AiError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the URL of the generated image.
    async fn generate(&self, prompt: &str) -> Result<String, AiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AiError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(
            AiError::Status {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            AiError::Status {
                status: 503,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !AiError::Status {
                status: 401,
                body: String::new()
            }
            .is_transient()
        );
        assert!(!AiError::MissingKey.is_transient());
        assert!(!AiError::InvalidResponse("x".into()).is_transient());
    }
}
