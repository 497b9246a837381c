//! Server-rendered HTML for the public site.
//!
//! Pages are plain strings assembled with `format!`; every piece of stored
//! or model-generated text goes through [`escape_html`] before it is
//! interpolated.

pub mod pages;
pub mod seo;

use crate::models::SiteConfig;

/// Escape text for HTML element content and quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Head metadata for one page.
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    /// Path of the page, joined with the site base URL for the canonical link.
    pub path: String,
    pub image: Option<String>,
    pub is_article: bool,
}

pub fn layout(site: &SiteConfig, meta: &PageMeta, body: &str) -> String {
    let title = if meta.title.is_empty() {
        site.site_name.clone()
    } else {
        format!("{} | {}", meta.title, site.site_name)
    };
    let description = if meta.description.is_empty() {
        &site.description
    } else {
        &meta.description
    };
    let canonical = site.absolute_url(&meta.path);

    let mut head = format!(
        r#"<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<meta name="description" content="{description}">
<link rel="canonical" href="{canonical}">
<meta property="og:site_name" content="{site_name}">
<meta property="og:title" content="{og_title}">
<meta property="og:description" content="{description}">
<meta property="og:url" content="{canonical}">
<meta property="og:type" content="{og_type}">
"#,
        title = escape_html(&title),
        description = escape_html(description),
        canonical = escape_html(&canonical),
        site_name = escape_html(&site.site_name),
        og_title = escape_html(if meta.title.is_empty() { &site.site_name } else { &meta.title }),
        og_type = if meta.is_article { "article" } else { "website" },
    );
    if let Some(image) = &meta.image {
        head.push_str(&format!(
            "<meta property=\"og:image\" content=\"{0}\">\n<meta name=\"twitter:card\" content=\"summary_large_image\">\n<meta name=\"twitter:image\" content=\"{0}\">\n",
            escape_html(image)
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
{head}<style>{css}</style>
</head>
<body>
{header}
<main class="container">
{body}
</main>
{footer}
</body>
</html>
"#,
        css = stylesheet(site),
        header = header(site),
        footer = footer(site),
    )
}

fn stylesheet(site: &SiteConfig) -> String {
    let t = &site.theme;
    format!(
        ":root{{--primary:{primary};--accent:{accent};--bg:{bg};}}\
         *{{box-sizing:border-box}}\
         body{{margin:0;background:var(--bg);color:#222;font-family:{font};line-height:1.6}}\
         a{{color:var(--primary)}}a:hover{{color:var(--accent)}}\
         .container{{max-width:1100px;margin:0 auto;padding:1.5rem}}\
         header.site{{background:var(--primary);color:#fff;padding:1rem 0}}\
         header.site a{{color:#fff;text-decoration:none}}\
         header.site .brand{{font-size:1.8rem;font-weight:bold}}\
         header.site .tagline{{opacity:.8;font-size:.95rem}}\
         nav.categories{{display:flex;flex-wrap:wrap;gap:1rem;margin-top:.5rem;font-size:.9rem;text-transform:capitalize}}\
         .grid{{display:grid;grid-template-columns:repeat(auto-fill,minmax(300px,1fr));gap:1.5rem}}\
         .card{{background:#fff;border-radius:6px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,.1)}}\
         .card img{{width:100%;aspect-ratio:1200/630;object-fit:cover;display:block}}\
         .card .body{{padding:1rem}}\
         .card h2,.card h3{{margin:.25rem 0;font-size:1.15rem}}\
         .card h2 a,.card h3 a{{text-decoration:none}}\
         .meta{{color:#777;font-size:.85rem;text-transform:capitalize}}\
         .badge{{background:var(--accent);color:#fff;border-radius:3px;padding:0 .4rem;font-size:.75rem;margin-right:.4rem}}\
         .hero{{display:grid;grid-template-columns:2fr 1fr;gap:1.5rem;margin-bottom:2rem}}\
         .hero h1{{font-size:2rem;margin:.5rem 0}}\
         .trending ol{{padding-left:1.2rem}}\
         article.story{{background:#fff;padding:2rem;border-radius:6px;max-width:780px;margin:0 auto}}\
         article.story h1{{font-size:2.2rem;line-height:1.2}}\
         article.story figure{{margin:1rem 0}}\
         article.story figure img{{width:100%;border-radius:4px}}\
         article.story figcaption,.source{{color:#777;font-size:.85rem}}\
         .related{{max-width:780px;margin:2rem auto}}\
         footer.site{{border-top:1px solid #ddd;margin-top:3rem;padding:1.5rem 0;font-size:.85rem;color:#777}}\
         footer.site nav{{display:flex;gap:1rem;flex-wrap:wrap}}\
         @media(max-width:720px){{.hero{{grid-template-columns:1fr}}}}",
        primary = css_value(&t.primary_color),
        accent = css_value(&t.accent_color),
        bg = css_value(&t.background_color),
        font = css_value(&t.font_family),
    )
}

/// Theme values come from admin-editable config; keep them inside the
/// declaration they are placed in.
fn css_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ';' | '{' | '}' | '<' | '>'))
        .collect()
}

fn header(site: &SiteConfig) -> String {
    let categories: String = site
        .categories
        .iter()
        .map(|c| format!(r#"<a href="/{0}-news">{1}</a>"#, escape_html(c), escape_html(c)))
        .collect();
    format!(
        r#"<header class="site"><div class="container">
<a class="brand" href="/">{name}</a>
<div class="tagline">{tagline}</div>
<nav class="categories">{categories}</nav>
</div></header>"#,
        name = escape_html(&site.site_name),
        tagline = escape_html(&site.tagline),
    )
}

fn footer(site: &SiteConfig) -> String {
    format!(
        r#"<footer class="site"><div class="container">
<nav><a href="/about">About</a><a href="/contact">Contact</a><a href="/privacy">Privacy</a><a href="/terms">Terms</a><a href="/sitemap.xml">Sitemap</a></nav>
<p>&copy; {name}. Stories are rewritten from public sources, with a link to each original.</p>
</div></footer>"#,
        name = escape_html(&site.site_name),
    )
}
