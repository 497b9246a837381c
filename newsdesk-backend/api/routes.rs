use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use hyper::header;
use tower_http::cors::{Any, CorsLayer};

use super::{AppState, admin, json, middleware, site, webhook};
use crate::render::pages::LegalPage;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(vec![header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(site::home))
        .route("/telegram", post(webhook::telegram_webhook))
        .route("/health", get(admin::health))
        .route("/debug", get(admin::debug))
        .route("/test-openai", get(admin::test_openai))
        .route("/force-cron", get(admin::force_cron).post(admin::force_cron))
        .route("/sitemap.xml", get(site::sitemap))
        .route("/robots.txt", get(site::robots))
        .route("/article/{id}", get(site::article_by_id))
        .merge(legal_router())
        .route("/{category}", get(site::category))
        .route("/{category}/{slug_id}", get(site::article))
        .nest("/api", api_router())
        .fallback(site::not_found_fallback)
        .with_state(state)
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::strip_trailing_slash))
        .layer(axum::middleware::from_fn(
            middleware::enrich_current_span_middleware,
        ))
}

fn legal_router() -> Router<AppState> {
    LegalPage::all().into_iter().fold(Router::new(), |router, page| {
        router.route(
            &format!("/{}", page.slug()),
            get(move |State(state): State<AppState>| site::legal(state, page)),
        )
    })
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/articles", get(json::list_articles))
        .route("/articles/{id}", get(json::get_article))
        .route("/stats", get(json::get_stats))
        .route("/config", get(json::get_config))
}
