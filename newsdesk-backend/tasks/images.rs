use crate::models::ArticleImage;
use crate::tasks::ai::ImageGenerator;

const STYLE_SUFFIX: &str =
    "Photorealistic editorial news photograph, natural light, 16:9, no text, no logos, no watermarks.";

/// Headline keywords and the scene they map to. Checked in order.
const KEYWORD_SCENES: &[(&[&str], &str)] = &[
    (
        &["election", "parliament", "senate", "congress", "minister", "president", "vote"],
        "a government building with flags under a dramatic sky",
    ),
    (
        &["economy", "inflation", "market", "stocks", "bank", "interest rate", "trade"],
        "a busy financial district with trading screens reflected in glass",
    ),
    (
        &["ai", "artificial intelligence", "robot", "chip", "software", "startup", "tech"],
        "a modern technology lab with glowing circuit boards",
    ),
    (
        &["climate", "flood", "wildfire", "storm", "heatwave", "hurricane", "drought"],
        "a dramatic landscape shaped by extreme weather",
    ),
    (
        &["space", "nasa", "rocket", "moon", "mars", "satellite", "telescope"],
        "a rocket launch against a twilight sky",
    ),
    (
        &["health", "hospital", "vaccine", "virus", "cancer", "doctor", "disease"],
        "a calm hospital corridor with medical staff",
    ),
    (
        &["football", "soccer", "tennis", "olympic", "championship", "match", "league"],
        "a packed sports stadium under floodlights",
    ),
    (
        &["film", "movie", "music", "album", "festival", "actor", "celebrity"],
        "a red carpet event with stage lights",
    ),
    (
        &["police", "court", "trial", "arrest", "crime", "murder", "judge"],
        "the steps of a courthouse on an overcast day",
    ),
    (
        &["war", "military", "troops", "missile", "ceasefire", "conflict", "attack"],
        "a distant city skyline with smoke on the horizon",
    ),
];

fn category_scene(category: &str) -> &'static str {
    match category {
        "politics" => "a parliament building at dusk",
        "business" => "a city skyline at sunrise with office towers",
        "technology" => "a clean desk with laptops and soft screen glow",
        "science" => "a research laboratory with scientific instruments",
        "health" => "a bright modern clinic interior",
        "sports" => "an empty stadium pitch in golden light",
        "entertainment" => "a theatre stage with warm spotlights",
        _ => "a world map on a newsroom wall",
    }
}

/// Word-level match so "ai" does not fire on "said" or "rain".
fn headline_mentions(headline: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return headline.contains(keyword);
    }
    headline
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == keyword)
}

pub fn image_prompt(headline: &str, category: &str) -> String {
    let lowered = headline.to_lowercase();
    let scene = KEYWORD_SCENES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| headline_mentions(&lowered, k)))
        .map(|(_, scene)| *scene)
        .unwrap_or_else(|| category_scene(category));

    format!("Illustration for a news story titled \"{headline}\": {scene}. {STYLE_SUFFIX}")
}

pub fn placeholder_image(slug: &str, category: &str) -> String {
    format!("https://picsum.photos/seed/{category}-{slug}/1200/630")
}

/// Generate an illustration, falling back to a placeholder. Never fails.
pub async fn acquire_image(
    generator: Option<&dyn ImageGenerator>,
    title: &str,
    slug: &str,
    category: &str,
) -> ArticleImage {
    let alt = title.to_string();
    if let Some(generator) = generator {
        let prompt = image_prompt(title, category);
        match generator.generate(&prompt).await {
            Ok(url) => {
                return ArticleImage {
                    url,
                    alt,
                    credit: "AI generated illustration".to_string(),
                };
            }
            Err(e) => {
                tracing::warn!(slug = %slug, error = %e, "Image generation failed, using placeholder");
            }
        }
    }

    ArticleImage {
        url: placeholder_image(slug, category),
        alt,
        credit: "Placeholder image".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::ai::AiError;
    use async_trait::async_trait;

    struct FixedGenerator(Result<&'static str, ()>);

    #[async_trait]
    impl ImageGenerator for FixedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, AiError> {
            assert!(prompt.contains("no text"));
            match self.0 {
                Ok(url) => Ok(url.to_string()),
                Err(()) => Err(AiError::Status {
                    status: 500,
                    body: "boom".into(),
                }),
            }
        }
    }

    #[test]
    fn test_keyword_scene_matches() {
        let prompt = image_prompt("Central Bank Holds Interest Rate Steady", "world");
        assert!(prompt.contains("financial district"));
        assert!(prompt.ends_with(STYLE_SUFFIX));
    }

    #[test]
    fn test_ai_keyword_is_word_level() {
        let prompt = image_prompt("Minister said rain will ease", "world");
        assert!(!prompt.contains("technology lab"));
        assert!(prompt.contains("government building"));

        let prompt = image_prompt("New AI model tops benchmark", "world");
        assert!(prompt.contains("technology lab"));
    }

    #[test]
    fn test_category_fallback() {
        let prompt = image_prompt("Quiet day in the village", "sports");
        assert!(prompt.contains("stadium pitch"));
    }

    #[test]
    fn test_placeholder_is_deterministic() {
        assert_eq!(
            placeholder_image("storm-hits", "world"),
            "https://picsum.photos/seed/world-storm-hits/1200/630"
        );
    }

    #[tokio::test]
    async fn test_acquire_image_uses_generator() {
        let generator = FixedGenerator(Ok("https://img.example.com/a.png"));
        let image = acquire_image(Some(&generator), "Storm hits", "storm-hits", "world").await;
        assert_eq!(image.url, "https://img.example.com/a.png");
        assert_eq!(image.alt, "Storm hits");
    }

    #[tokio::test]
    async fn test_acquire_image_falls_back() {
        let generator = FixedGenerator(Err(()));
        let image = acquire_image(Some(&generator), "Storm hits", "storm-hits", "world").await;
        assert_eq!(image.url, placeholder_image("storm-hits", "world"));

        let image = acquire_image(None, "Storm hits", "storm-hits", "world").await;
        assert_eq!(image.credit, "Placeholder image");
    }
}
