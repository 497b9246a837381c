use super::{PageMeta, escape_html, layout};
use crate::models::{Article, SiteConfig};
use crate::tasks::context::truncate_chars;

const RELATED_COUNT: usize = 3;
const HOME_LATEST: usize = 24;

/// Static pages linked from the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegalPage {
    Privacy,
    Terms,
    About,
    Contact,
}

impl LegalPage {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "privacy" => Some(LegalPage::Privacy),
            "terms" => Some(LegalPage::Terms),
            "about" => Some(LegalPage::About),
            "contact" => Some(LegalPage::Contact),
            _ => None,
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            LegalPage::Privacy => "privacy",
            LegalPage::Terms => "terms",
            LegalPage::About => "about",
            LegalPage::Contact => "contact",
        }
    }

    pub fn all() -> [LegalPage; 4] {
        [
            LegalPage::About,
            LegalPage::Contact,
            LegalPage::Privacy,
            LegalPage::Terms,
        ]
    }

    fn title(self) -> &'static str {
        match self {
            LegalPage::Privacy => "Privacy Policy",
            LegalPage::Terms => "Terms of Use",
            LegalPage::About => "About",
            LegalPage::Contact => "Contact",
        }
    }
}

fn card(article: &Article, heading: &str) -> String {
    let image = article
        .image
        .as_ref()
        .map(|img| {
            format!(
                r#"<a href="{href}"><img src="{src}" alt="{alt}" loading="lazy"></a>"#,
                href = escape_html(&article.canonical_path()),
                src = escape_html(&img.url),
                alt = escape_html(&img.alt),
            )
        })
        .unwrap_or_default();
    format!(
        r#"<div class="card">{image}<div class="body">
<div class="meta">{badge}{category} · {date}</div>
<{heading}><a href="{href}">{title}</a></{heading}>
<p>{preview}</p>
</div></div>"#,
        badge = if article.trending { r#"<span class="badge">Trending</span>"# } else { "" },
        category = escape_html(&article.category),
        date = escape_html(&article.date),
        href = escape_html(&article.canonical_path()),
        title = escape_html(&article.title),
        preview = escape_html(&truncate_chars(&article.preview, 220)),
    )
}

pub fn home_page(site: &SiteConfig, articles: &[Article]) -> String {
    let mut body = String::new();

    match articles.split_first() {
        None => body.push_str(
            r#"<section class="empty"><h1>No stories yet</h1><p>The newsroom is warming up. Check back soon.</p></section>"#,
        ),
        Some((lead, rest)) => {
            let trending: String = articles
                .iter()
                .filter(|a| a.trending)
                .map(|a| {
                    format!(
                        r#"<li><a href="{}">{}</a></li>"#,
                        escape_html(&a.canonical_path()),
                        escape_html(&a.title)
                    )
                })
                .collect();
            let side = if trending.is_empty() {
                format!("<p>{}</p>", escape_html(&site.description))
            } else {
                format!("<h2>Trending</h2><ol>{trending}</ol>")
            };
            body.push_str(&format!(
                r#"<section class="hero">{lead}<aside class="trending">{side}</aside></section>"#,
                lead = card(lead, "h1"),
            ));

            let latest: String = rest.iter().take(HOME_LATEST).map(|a| card(a, "h2")).collect();
            if !latest.is_empty() {
                body.push_str(&format!(
                    r#"<h2>Latest</h2><section class="grid">{latest}</section>"#
                ));
            }
        }
    }

    let meta = PageMeta {
        title: String::new(),
        description: site.description.clone(),
        path: "/".to_string(),
        image: articles
            .first()
            .and_then(|a| a.image.as_ref())
            .map(|i| i.url.clone()),
        is_article: false,
    };
    layout(site, &meta, &body)
}

/// Up to three other articles from the same category, newest first.
pub fn related_articles<'a>(articles: &'a [Article], article: &Article) -> Vec<&'a Article> {
    articles
        .iter()
        .filter(|a| a.category == article.category && a.id != article.id)
        .take(RELATED_COUNT)
        .collect()
}

pub fn article_page(site: &SiteConfig, article: &Article, related: &[&Article]) -> String {
    let paragraphs: String = article
        .full_content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>\n", escape_html(p).replace('\n', "<br>")))
        .collect();

    let figure = article
        .image
        .as_ref()
        .map(|img| {
            let credit = if img.credit.is_empty() {
                String::new()
            } else {
                format!("<figcaption>{}</figcaption>", escape_html(&img.credit))
            };
            format!(
                r#"<figure><img src="{}" alt="{}">{credit}</figure>"#,
                escape_html(&img.url),
                escape_html(&img.alt)
            )
        })
        .unwrap_or_default();

    let mut body = format!(
        r#"<article class="story">
<div class="meta"><a href="/{category_slug}-news">{category}</a> · {date}</div>
<h1>{title}</h1>
{figure}
{paragraphs}
<p class="source">Source: <a href="{url}" rel="nofollow noopener" target="_blank">{source}</a></p>
</article>"#,
        category_slug = escape_html(&article.category),
        category = escape_html(&article.category),
        date = escape_html(&article.date),
        title = escape_html(&article.title),
        url = escape_html(&article.url),
        source = escape_html(&article.source),
    );

    if !related.is_empty() {
        let cards: String = related.iter().map(|a| card(a, "h3")).collect();
        body.push_str(&format!(
            r#"<section class="related"><h2>More in {}</h2><div class="grid">{cards}</div></section>"#,
            escape_html(&article.category)
        ));
    }

    let meta = PageMeta {
        title: article.title.clone(),
        description: truncate_chars(&article.preview, 160),
        path: article.canonical_path(),
        image: article.image.as_ref().map(|i| i.url.clone()),
        is_article: true,
    };
    layout(site, &meta, &body)
}

pub fn category_page(site: &SiteConfig, category: &str, articles: &[&Article]) -> String {
    let label = escape_html(category);
    let body = if articles.is_empty() {
        format!(
            r#"<h1 class="meta">{label} news</h1><p>No {label} stories yet. <a href="/">Back to the front page</a>.</p>"#
        )
    } else {
        let cards: String = articles.iter().map(|a| card(a, "h2")).collect();
        format!(r#"<h1 class="meta">{label} news</h1><section class="grid">{cards}</section>"#)
    };

    let meta = PageMeta {
        title: format!("{} news", capitalize(category)),
        description: format!("The latest {category} stories from {}.", site.site_name),
        path: format!("/{category}-news"),
        image: None,
        is_article: false,
    };
    layout(site, &meta, &body)
}

pub fn not_found_page(site: &SiteConfig) -> String {
    let body = r#"<section class="empty"><h1>Page not found</h1><p>The story you were looking for has moved or no longer exists. <a href="/">Back to the front page</a>.</p></section>"#;
    let meta = PageMeta {
        title: "Page not found".to_string(),
        path: "/404".to_string(),
        ..Default::default()
    };
    layout(site, &meta, body)
}

pub fn legal_page(site: &SiteConfig, page: LegalPage) -> String {
    let name = escape_html(&site.site_name);
    let email = escape_html(&site.contact_email);
    let content = match page {
        LegalPage::About => format!(
            "<p>{name} publishes short news stories rewritten from public sources around the web. \
             Every article links to the original report so readers can go deeper.</p>\
             <p>{tagline}</p>",
            tagline = escape_html(&site.tagline),
        ),
        LegalPage::Contact => format!(
            "<p>Questions, corrections or takedown requests can be sent to \
             <a href=\"mailto:{email}\">{email}</a>. We aim to reply within two working days.</p>"
        ),
        LegalPage::Privacy => format!(
            "<p>{name} does not use accounts or advertising cookies. To understand our audience we \
             count page views by day, hour, referring site, device type and country. No personal \
             identifiers are stored.</p>\
             <p>Contact <a href=\"mailto:{email}\">{email}</a> with any privacy question.</p>"
        ),
        LegalPage::Terms => format!(
            "<p>Articles on {name} are summaries written with the help of automated tools and may \
             contain mistakes. Always consult the linked original source before relying on a story.</p>\
             <p>Content is provided as is, without warranty. Trademarks belong to their owners.</p>"
        ),
    };
    let body = format!(
        r#"<article class="story"><h1>{}</h1>{content}</article>"#,
        page.title()
    );
    let meta = PageMeta {
        title: page.title().to_string(),
        path: format!("/{}", page.slug()),
        ..Default::default()
    };
    layout(site, &meta, &body)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArticleImage;
    use crate::models::article::sample_article;

    #[test]
    fn test_home_page_empty_and_full() {
        let site = SiteConfig::default();
        assert!(home_page(&site, &[]).contains("No stories yet"));

        let mut lead = sample_article("a1", "Lead <story>", "world");
        lead.trending = true;
        let html = home_page(&site, &[lead, sample_article("a2", "Second", "business")]);
        assert!(html.contains("Lead &lt;story&gt;"));
        assert!(html.contains("<h2>Trending</h2>"));
        assert!(html.contains("/business-news/second-a2"));
    }

    #[test]
    fn test_article_page_paragraphs_and_related() {
        let site = SiteConfig::default();
        let mut article = sample_article("a1", "Storm hits", "world");
        article.full_content = "First <b>para</b>.\n\nSecond para.".into();
        article.image = Some(ArticleImage {
            url: "https://img.example.com/s.png".into(),
            alt: "Storm".into(),
            credit: "Placeholder image".into(),
        });
        let other = sample_article("a2", "Another world story", "world");
        let html = article_page(&site, &article, &[&other]);

        assert!(html.contains("<p>First &lt;b&gt;para&lt;/b&gt;.</p>"));
        assert!(html.contains("<p>Second para.</p>"));
        assert!(html.contains("<figcaption>Placeholder image</figcaption>"));
        assert!(html.contains("More in world"));
        assert!(html.contains("Another world story"));
    }

    #[test]
    fn test_related_articles_same_category_only() {
        let articles = vec![
            sample_article("a1", "One", "world"),
            sample_article("a2", "Two", "world"),
            sample_article("a3", "Three", "sports"),
            sample_article("a4", "Four", "world"),
            sample_article("a5", "Five", "world"),
            sample_article("a6", "Six", "world"),
        ];
        let related = related_articles(&articles, &articles[0]);
        let ids: Vec<&str> = related.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a4", "a5"]);
    }

    #[test]
    fn test_category_page() {
        let site = SiteConfig::default();
        let a = sample_article("a1", "Match report", "sports");
        let html = category_page(&site, "sports", &[&a]);
        assert!(html.contains("<title>Sports news | Newsdesk</title>"));
        assert!(html.contains("Match report"));
        assert!(category_page(&site, "sports", &[]).contains("No sports stories yet"));
    }

    #[test]
    fn test_legal_pages() {
        let site = SiteConfig::default();
        for page in LegalPage::all() {
            assert_eq!(LegalPage::from_slug(page.slug()), Some(page));
            let html = legal_page(&site, page);
            assert!(html.contains(page.title()));
        }
        assert!(legal_page(&site, LegalPage::Contact).contains("mailto:editor@example.com"));
        assert_eq!(LegalPage::from_slug("cookies"), None);
    }

    #[test]
    fn test_not_found_page() {
        assert!(not_found_page(&SiteConfig::default()).contains("Page not found"));
    }
}
