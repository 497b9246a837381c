use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::{Html, IntoResponse, Response};
use chrono::{Timelike, Utc};
use hyper::StatusCode;

use super::AppState;
use crate::models::SiteConfig;
use crate::models::article::split_slug_id;
use crate::models::stats::{DeviceClass, PageView};
use crate::render::pages::{self, LegalPage};
use crate::render::seo;
use crate::store::StoreError;

fn page_error(e: StoreError) -> Response {
    tracing::error!(error = %e, "Failed to load page data");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html("<h1>Something went wrong</h1><p>Please try again shortly.</p>".to_string()),
    )
        .into_response()
}

fn moved_permanently(path: &str) -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, path.to_string())]).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn not_found(site: &SiteConfig) -> Response {
    (StatusCode::NOT_FOUND, Html(pages::not_found_page(site))).into_response()
}

/// `{category}-news` segment to a configured category.
fn category_from_segment<'a>(site: &SiteConfig, segment: &'a str) -> Option<&'a str> {
    segment
        .strip_suffix("-news")
        .filter(|c| site.has_category(c))
}

pub(crate) async fn home(State(state): State<AppState>) -> Response {
    let (site, articles) = match tokio::try_join!(state.store.site_config(), state.store.articles()) {
        Ok(pair) => pair,
        Err(e) => return page_error(e),
    };
    Html(pages::home_page(&site, &articles)).into_response()
}

pub(crate) async fn category(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> Response {
    let (site, articles) = match tokio::try_join!(state.store.site_config(), state.store.articles()) {
        Ok(pair) => pair,
        Err(e) => return page_error(e),
    };
    let Some(category) = category_from_segment(&site, &segment) else {
        return not_found(&site);
    };
    let matching: Vec<_> = articles.iter().filter(|a| a.category == category).collect();
    Html(pages::category_page(&site, category, &matching)).into_response()
}

pub(crate) async fn article(
    State(state): State<AppState>,
    Path((segment, slug_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let (site, articles) = match tokio::try_join!(state.store.site_config(), state.store.articles()) {
        Ok(pair) => pair,
        Err(e) => return page_error(e),
    };
    if category_from_segment(&site, &segment).is_none() {
        return not_found(&site);
    }
    let Some((_, id)) = split_slug_id(&slug_id) else {
        return not_found(&site);
    };
    let Some(article) = articles.iter().find(|a| a.id == id) else {
        return not_found(&site);
    };

    // Old slugs and moved categories land on the canonical URL.
    let canonical = article.canonical_path();
    if canonical != format!("/{segment}/{slug_id}") {
        return moved_permanently(&canonical);
    }

    record_view(&state, Some(&article.id), &headers).await;

    let related = pages::related_articles(&articles, article);
    Html(pages::article_page(&site, article, &related)).into_response()
}

/// Short link `/article/{id}`.
pub(crate) async fn article_by_id(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.article(&id).await {
        Ok(Some(article)) => moved_permanently(&article.canonical_path()),
        Ok(None) => match state.store.site_config().await {
            Ok(site) => not_found(&site),
            Err(e) => page_error(e),
        },
        Err(e) => page_error(e),
    }
}

pub(crate) async fn legal(state: AppState, page: LegalPage) -> Response {
    match state.store.site_config().await {
        Ok(site) => Html(pages::legal_page(&site, page)).into_response(),
        Err(e) => page_error(e),
    }
}

pub(crate) async fn sitemap(State(state): State<AppState>) -> Response {
    let (site, articles) = match tokio::try_join!(state.store.site_config(), state.store.articles()) {
        Ok(pair) => pair,
        Err(e) => return page_error(e),
    };
    (
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        seo::sitemap_xml(&site, &articles),
    )
        .into_response()
}

pub(crate) async fn robots(State(state): State<AppState>) -> Response {
    match state.store.site_config().await {
        Ok(site) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            seo::robots_txt(&site),
        )
            .into_response(),
        Err(e) => page_error(e),
    }
}

pub(crate) async fn not_found_fallback(State(state): State<AppState>, uri: axum::http::Uri) -> Response {
    tracing::warn!("unhandled path: {}", uri);
    match state.store.site_config().await {
        Ok(site) => not_found(&site),
        Err(_) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    }
}

/// Count one page view. Failures are logged; the page still renders.
async fn record_view(state: &AppState, article_id: Option<&str>, headers: &HeaderMap) {
    let now = Utc::now().with_timezone(&state.scheduler.offset());
    let view = PageView {
        article_id,
        day: now.format("%Y-%m-%d").to_string(),
        hour: now.hour(),
        referrer: header_str(headers, "referer"),
        device: DeviceClass::from_user_agent(header_str(headers, "user-agent").unwrap_or_default()),
        country: header_str(headers, "cf-ipcountry"),
    };

    if let Err(e) = state.store.update_stats(|s| s.record_view(&view)).await {
        tracing::warn!(error = %e, "Failed to record page view");
        return;
    }
    if view.device == DeviceClass::Bot {
        return;
    }
    if let Some(id) = article_id {
        let result = state
            .store
            .update_articles(|articles| {
                if let Some(article) = articles.iter_mut().find(|a| a.id == id) {
                    article.views += 1;
                }
            })
            .await;
        if let Err(e) = result {
            tracing::warn!(id, error = %e, "Failed to count article view");
        }
    }
}
