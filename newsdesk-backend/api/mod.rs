pub mod admin;
pub mod json;
pub mod middleware;
mod routes;
pub mod site;
pub mod webhook;

use std::sync::Arc;

use axum::Router;

use crate::config::Config;
use crate::schedule::PublishScheduler;
use crate::store::SiteStore;
use crate::tasks::ai::ArticleWriter;
use crate::telegram::BotService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SiteStore>,
    pub scheduler: Arc<PublishScheduler>,
    /// Used by `/test-openai` for a single ping completion.
    pub writer: Arc<dyn ArticleWriter>,
    /// Present only when a bot token is configured.
    pub bot: Option<Arc<BotService>>,
}

pub fn create_app(state: AppState) -> Router {
    routes::build_router(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::schedule::scheduler::tests::{EchoWriter, scheduler};

    pub(crate) fn config(pairs: &[(&str, &str)]) -> Config {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    pub(crate) fn state_with(pairs: &[(&str, &str)]) -> AppState {
        let store = Arc::new(SiteStore::in_memory());
        AppState {
            config: Arc::new(config(pairs)),
            scheduler: scheduler(store.clone()),
            store,
            writer: Arc::new(EchoWriter),
            bot: None,
        }
    }

    pub(crate) fn state() -> AppState {
        state_with(&[("CRON_SECRET", "s3cret")])
    }

    pub(crate) async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
