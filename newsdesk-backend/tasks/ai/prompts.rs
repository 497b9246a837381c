use std::collections::HashMap;

use serde::Deserialize;

use super::{AiError, GeneratedArticle};
use crate::models::site::normalize_category;
use crate::tasks::context::{render_prompt, truncate_chars};
use crate::tasks::sources::SourceItem;

const PREVIEW_LEN: usize = 200;
const SUMMARY_LEN: usize = 1500;

pub const SYSTEM_PROMPT: &str = "You are the senior editor of an online news site. \
You rewrite wire stories into original, factual articles in clear British-neutral English. \
Never invent quotes, numbers or names that are not in the source material. \
Always answer with a single JSON object and nothing else.";

const USER_TEMPLATE: &str = r#"Rewrite the following story as a news article.

Source: {{source}}
Original headline: {{title}}
Source material:
{{summary}}

Requirements:
- Write a new, specific headline of at most 90 characters. Do not copy the original headline.
- Write 4 to 6 paragraphs separated by blank lines.
- Write a one or two sentence preview.
- Pick the best category from: {{categories}}. If unsure use "{{category}}".

Respond with JSON: {"title": "...", "content": "...", "preview": "...", "category": "..."}"#;

pub fn user_prompt(item: &SourceItem, categories: &[String]) -> String {
    let summary = if item.summary.trim().is_empty() {
        "(no summary available; write from the headline only and keep it short)".to_string()
    } else {
        truncate_chars(&item.summary, SUMMARY_LEN)
    };

    let mut vars = HashMap::new();
    vars.insert("source".to_string(), item.source.clone());
    vars.insert("title".to_string(), item.title.clone());
    vars.insert("summary".to_string(), summary);
    vars.insert("categories".to_string(), categories.join(", "));
    vars.insert("category".to_string(), item.category.clone());
    render_prompt(USER_TEMPLATE, &vars)
}

#[derive(Debug, Deserialize)]
struct RawGenerated {
    #[serde(default, alias = "headline")]
    title: String,
    #[serde(default, alias = "body", alias = "fullContent", alias = "article")]
    content: String,
    #[serde(default, alias = "summary")]
    preview: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

/// Pull the JSON object out of a model reply that may be wrapped in code
/// fences or prose.
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (start < end).then(|| &unfenced[start..=end])
}

pub fn parse_generated(
    raw: &str,
    item: &SourceItem,
    categories: &[String],
) -> Result<GeneratedArticle, AiError> {
    let json = extract_json(raw)
        .ok_or_else(|| AiError::InvalidResponse("no JSON object in reply".to_string()))?;
    let parsed: RawGenerated = serde_json::from_str(json)
        .map_err(|e| AiError::InvalidResponse(format!("malformed JSON: {e}")))?;

    let title = parsed
        .title
        .trim()
        .trim_matches(&['"', '\''][..])
        .trim()
        .to_string();
    let content = parsed.content.trim().replace("\r\n", "\n");
    if title.is_empty() || content.is_empty() {
        return Err(AiError::InvalidResponse(
            "reply is missing title or content".to_string(),
        ));
    }

    let category = parsed
        .category
        .map(|c| normalize_category(&c))
        .filter(|c| categories.iter().any(|known| known == c))
        .unwrap_or_else(|| item.category.clone());

    let preview = parsed
        .preview
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| {
            let first = content.split("\n\n").next().unwrap_or(&content);
            truncate_chars(first, PREVIEW_LEN)
        });

    Ok(GeneratedArticle {
        title,
        content,
        preview,
        category,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> SourceItem {
        SourceItem {
            title: "Storm batters coast".into(),
            url: "https://example.com/storm".into(),
            summary: "Winds of 100mph hit the coast overnight.".into(),
            published: None,
            source: "Example Wire".into(),
            category: "world".into(),
            image_url: None,
        }
    }

    fn categories() -> Vec<String> {
        vec!["world".into(), "science".into(), "technology".into()]
    }

    #[test]
    fn test_user_prompt_fills_placeholders() {
        let prompt = user_prompt(&item(), &categories());
        assert!(prompt.contains("Original headline: Storm batters coast"));
        assert!(prompt.contains("Source: Example Wire"));
        assert!(prompt.contains("world, science, technology"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_extract_json_handles_fences_and_prose() {
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), Some("{\"a\":1}"));
        assert_eq!(extract_json("Sure! Here it is: {\"a\":1} Hope it helps"), Some("{\"a\":1}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_parse_generated_full_reply() {
        let raw = r#"```json
{"title": "Coastal towns count cost of overnight storm", "content": "Para one.\n\nPara two.", "preview": "Towns assess damage.", "category": "Science"}
```"#;
        let article = parse_generated(raw, &item(), &categories()).unwrap();
        assert_eq!(article.title, "Coastal towns count cost of overnight storm");
        assert_eq!(article.content, "Para one.\n\nPara two.");
        assert_eq!(article.preview, "Towns assess damage.");
        assert_eq!(article.category, "science");
    }

    #[test]
    fn test_unknown_category_falls_back_to_source() {
        let raw = r#"{"title": "T", "content": "Body", "category": "astrology"}"#;
        let article = parse_generated(raw, &item(), &categories()).unwrap();
        assert_eq!(article.category, "world");
    }

    #[test]
    fn test_missing_preview_uses_first_paragraph() {
        let raw = r#"{"headline": "T", "body": "First paragraph here.\n\nSecond."}"#;
        let article = parse_generated(raw, &item(), &categories()).unwrap();
        assert_eq!(article.preview, "First paragraph here.");
    }

    #[test]
    fn test_empty_content_is_invalid() {
        let raw = r#"{"title": "Only a title", "content": "  "}"#;
        assert!(matches!(
            parse_generated(raw, &item(), &categories()),
            Err(AiError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_generated("I cannot help with that.", &item(), &categories()),
            Err(AiError::InvalidResponse(_))
        ));
    }
}
