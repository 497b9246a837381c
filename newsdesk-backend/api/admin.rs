use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use crate::models::Trigger;
use crate::schedule::scheduler::TickOutcome;
use crate::tasks::pipeline::PipelineError;

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into() })))
}

#[derive(Debug, Deserialize)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

/// Compare secrets without stopping at the first differing byte.
pub(crate) fn secrets_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Both maintenance endpoints require `CRON_SECRET` to be configured and
/// passed as `?secret=`.
fn check_secret(state: &AppState, query: &SecretQuery) -> Result<(), (StatusCode, Json<Value>)> {
    let Some(expected) = state.config.cron_secret.as_deref() else {
        return Err(error(StatusCode::FORBIDDEN, "CRON_SECRET is not configured"));
    };
    match query.secret.as_deref() {
        Some(given) if secrets_match(given, expected) => Ok(()),
        _ => {
            tracing::warn!("Rejected request with missing or wrong secret");
            Err(error(StatusCode::UNAUTHORIZED, "invalid secret"))
        }
    }
}

/// GET /health
pub(crate) async fn health(State(state): State<AppState>) -> ApiResult {
    let articles = state.store.articles().await.map_err(|e| {
        tracing::error!(error = %e, "Health check could not read articles");
        error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;
    Ok(Json(json!({
        "status": "ok",
        "articles": articles.len(),
        "time": Utc::now().to_rfc3339(),
    })))
}

/// GET /debug: configuration with secrets reduced to booleans, plus
/// scheduler and store state.
pub(crate) async fn debug(State(state): State<AppState>) -> ApiResult {
    let internal = |e: crate::store::StoreError| error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    let site = state.store.site_config().await.map_err(internal)?;
    let stats = state.store.stats().await.map_err(internal)?;
    let articles = state.store.articles().await.map_err(internal)?;
    let logs = state.store.cron_logs().await.map_err(internal)?;
    let initialized = state.store.initialized().await.map_err(internal)?;

    let config = &state.config;
    let now = Utc::now();
    let bucket = state.scheduler.current_bucket(now).map(|b| {
        json!({
            "name": b.name,
            "hours": b.hours_label(),
            "articles": b.articles,
            "sources": b.sources.iter().map(|s| s.label()).collect::<Vec<_>>(),
        })
    });

    Ok(Json(json!({
        "environment": config.environment,
        "siteUrl": config.site_url,
        "utcOffsetHours": config.utc_offset_hours,
        "openai": {
            "configured": config.openai.api_key.is_some(),
            "model": config.openai.model,
            "imageModel": config.openai.image_model,
            "imageGeneration": config.openai.image_generation,
            "timeoutSecs": config.openai.timeout.as_secs(),
        },
        "telegram": {
            "configured": config.telegram.bot_token.is_some(),
            "admins": config.telegram.admin_chat_ids.len(),
            "webhookSecret": config.telegram.webhook_secret.is_some(),
        },
        "cronSecret": config.cron_secret.is_some(),
        "scheduler": {
            "schedule": state.scheduler.schedule(),
            "running": state.scheduler.is_running().await,
            "nextRun": state.scheduler.next_run().map(|t| t.to_rfc3339()),
            "pipelineRunning": state.scheduler.pipeline().is_running(),
            "currentBucket": bucket,
        },
        "site": site,
        "stats": stats,
        "articles": articles.len(),
        "lastRun": logs.first(),
        "initialized": initialized,
    })))
}

/// GET /test-openai?secret=
pub(crate) async fn test_openai(
    State(state): State<AppState>,
    Query(query): Query<SecretQuery>,
) -> ApiResult {
    check_secret(&state, &query)?;
    match state.writer.ping().await {
        Ok(reply) => Ok(Json(json!({
            "ok": true,
            "model": state.config.openai.model,
            "reply": reply,
        }))),
        Err(e) => {
            tracing::error!(error = %e, "OpenAI ping failed");
            Err(error(StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

/// GET|POST /force-cron?secret=
pub(crate) async fn force_cron(
    State(state): State<AppState>,
    Query(query): Query<SecretQuery>,
) -> ApiResult {
    check_secret(&state, &query)?;
    tracing::info!("Forced publish run requested");

    match state.scheduler.tick(Trigger::Forced, Utc::now()).await {
        Ok(TickOutcome::Ran(report)) => Ok(Json(json!({ "ok": true, "report": report }))),
        Ok(TickOutcome::Paused) => Ok(Json(json!({ "ok": true, "paused": true }))),
        Err(e) => match e.downcast_ref::<PipelineError>() {
            Some(PipelineError::AlreadyRunning) => {
                Err(error(StatusCode::CONFLICT, "a publishing run is already in progress"))
            }
            _ => {
                tracing::error!(error = %format!("{e:#}"), "Forced run failed");
                Err(error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
            }
        },
    }
}
