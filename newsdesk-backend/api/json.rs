use axum::Json;
use axum::extract::{Path, Query, State};
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use crate::store::StoreError;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn internal(e: StoreError) -> (StatusCode, Json<Value>) {
    tracing::error!(error = %e, "Store read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

#[derive(Debug, Deserialize)]
pub struct ArticlesQuery {
    pub category: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/articles?category=&limit=
pub(crate) async fn list_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticlesQuery>,
) -> ApiResult {
    let articles = state.store.articles().await.map_err(internal)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let category = query.category.as_deref().filter(|c| !c.is_empty());

    let matching: Vec<_> = articles
        .iter()
        .filter(|a| category.is_none_or(|c| a.category.eq_ignore_ascii_case(c)))
        .collect();
    let total = matching.len();
    let page: Vec<_> = matching.into_iter().take(limit).collect();

    Ok(Json(json!({
        "articles": page,
        "total": total,
    })))
}

/// GET /api/articles/{id}
pub(crate) async fn get_article(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let article = state.store.article(&id).await.map_err(internal)?.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "article not found" })),
        )
    })?;
    Ok(Json(json!(article)))
}

/// GET /api/stats
pub(crate) async fn get_stats(State(state): State<AppState>) -> ApiResult {
    let stats = state.store.stats().await.map_err(internal)?;
    Ok(Json(json!(stats)))
}

/// GET /api/config with the publishing strategy left out.
pub(crate) async fn get_config(State(state): State<AppState>) -> ApiResult {
    let site = state.store.site_config().await.map_err(internal)?;
    Ok(Json(json!({
        "siteName": site.site_name,
        "tagline": site.tagline,
        "description": site.description,
        "baseUrl": site.base_url,
        "contactEmail": site.contact_email,
        "categories": site.categories,
        "theme": site.theme,
    })))
}
