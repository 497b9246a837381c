use chrono::{DateTime, Utc};

use super::escape_html;
use super::pages::LegalPage;
use crate::models::{Article, SiteConfig};

fn url_entry(loc: &str, lastmod: Option<DateTime<Utc>>, changefreq: &str, priority: &str) -> String {
    let lastmod = lastmod
        .map(|t| format!("<lastmod>{}</lastmod>", t.format("%Y-%m-%d")))
        .unwrap_or_default();
    format!(
        "  <url><loc>{}</loc>{lastmod}<changefreq>{changefreq}</changefreq><priority>{priority}</priority></url>\n",
        escape_html(loc)
    )
}

pub fn sitemap_xml(site: &SiteConfig, articles: &[Article]) -> String {
    let newest = articles.iter().filter_map(|a| a.published_at()).max();

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    xml.push_str(&url_entry(&site.absolute_url("/"), newest, "hourly", "1.0"));

    for category in &site.categories {
        let latest = articles
            .iter()
            .filter(|a| &a.category == category)
            .filter_map(|a| a.published_at())
            .max();
        xml.push_str(&url_entry(
            &site.absolute_url(&format!("/{category}-news")),
            latest,
            "hourly",
            "0.8",
        ));
    }

    for article in articles {
        xml.push_str(&url_entry(
            &site.absolute_url(&article.canonical_path()),
            article.published_at(),
            "weekly",
            "0.6",
        ));
    }

    for page in LegalPage::all() {
        xml.push_str(&url_entry(
            &site.absolute_url(&format!("/{}", page.slug())),
            None,
            "yearly",
            "0.3",
        ));
    }

    xml.push_str("</urlset>\n");
    xml
}

pub fn robots_txt(site: &SiteConfig) -> String {
    format!(
        "User-agent: *\nAllow: /\nDisallow: /api/\nDisallow: /telegram\nDisallow: /debug\nDisallow: /force-cron\nDisallow: /test-openai\n\nSitemap: {}\n",
        site.absolute_url("/sitemap.xml")
    )
}
