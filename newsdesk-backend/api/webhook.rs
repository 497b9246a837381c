use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::{Value, json};

use super::AppState;
use super::admin::secrets_match;
use crate::telegram::models::Update;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// POST /telegram. Always answers `200 {"ok": true}` so Telegram does not
/// redeliver; problems are logged instead.
pub(crate) async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let ok = Json(json!({ "ok": true }));

    if let Some(expected) = state.config.telegram.webhook_secret.as_deref() {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if !given.is_some_and(|given| secrets_match(given, expected)) {
            tracing::warn!("Ignoring webhook call with a wrong secret token");
            return ok;
        }
    }

    let Some(bot) = state.bot.clone() else {
        tracing::warn!("Webhook called but TELEGRAM_BOT_TOKEN is not configured");
        return ok;
    };

    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed Telegram update");
            return ok;
        }
    };

    tokio::spawn(async move {
        bot.handle_update(update).await;
    });
    ok
}
