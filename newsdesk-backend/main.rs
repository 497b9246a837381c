mod api;
mod config;
mod models;
mod render;
mod schedule;
mod store;
mod system;
mod tasks;
mod telegram;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::Request;
use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::models::Trigger;
use crate::schedule::{PriorityTable, PublishScheduler, site_hour};
use crate::store::SiteStore;
use crate::store::file_kv::FileKvStore;
use crate::tasks::ai::{ArticleWriter, ImageGenerator, OpenAiClient};
use crate::tasks::pipeline::Pipeline;
use crate::tasks::sinks::{Sink, TelegramSink};
use crate::tasks::sources::HttpSourceFetcher;
use crate::telegram::{BotService, HttpTelegramClient, TelegramApi};

#[derive(Parser)]
#[command(name = "newsdesk", about = "AI-managed news site")]
enum Cli {
    /// Start the HTTP server and publish scheduler (default when no subcommand is given)
    #[command(alias = "run")]
    Serve {
        /// Serve pages without starting the cron loop
        #[arg(long)]
        no_scheduler: bool,
    },
    /// Run the pipeline once and exit
    Fetch {
        /// Articles to publish (defaults to the bucket's count)
        #[arg(long)]
        count: Option<u32>,
        /// Priority bucket to use instead of the current hour's
        #[arg(long)]
        bucket: Option<String>,
    },
    /// Print the active priority table
    Buckets,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // Default to Serve when no subcommand is given, but still allow --help
    // and --version to work.
    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 {
        Cli::Serve { no_scheduler: false }
    } else {
        Cli::parse()
    };

    let config = Config::from_env();
    init_tracing();
    let _guard = sentry::init((
        config.sentry_dsn.clone().unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            send_default_pii: false,
            traces_sample_rate: 0.2,
            enable_logs: true,
            ..Default::default()
        },
    ));

    match cli {
        Cli::Serve { no_scheduler } => run_server(config, no_scheduler).await?,
        Cli::Fetch { count, bucket } => run_once(config, count, bucket).await?,
        Cli::Buckets => print_buckets(&config)?,
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("newsdesk=info,tower_http=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true).with_bracketed_fields(false))
        .with(sentry::integrations::tracing::layer().event_filter(
            |metadata| match *metadata.level() {
                tracing::Level::ERROR => sentry::integrations::tracing::EventFilter::Event,
                tracing::Level::WARN | tracing::Level::INFO => {
                    sentry::integrations::tracing::EventFilter::Breadcrumb
                }
                _ => sentry::integrations::tracing::EventFilter::Ignore,
            },
        ))
        .init();
}

/// Everything both the server and the one-shot CLI need.
struct Services {
    store: Arc<SiteStore>,
    scheduler: Arc<PublishScheduler>,
    writer: Arc<dyn ArticleWriter>,
    telegram: Option<Arc<dyn TelegramApi>>,
}

async fn build_services(config: &Config) -> Result<Services> {
    let http_client = Arc::new(
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(90))
            .build()
            .context("failed to build HTTP client")?,
    );

    let kv = FileKvStore::new(&config.data_dir);
    kv.load_all().await.context("failed to load store")?;
    let store = Arc::new(SiteStore::new(Arc::new(kv)));
    if system::initialize_system(&store, config).await? {
        tracing::info!(data_dir = %config.data_dir.display(), "Initialized fresh site data");
    }

    let priority = Arc::new(
        PriorityTable::load(config.priority_file.as_deref())
            .context("failed to load priority table")?,
    );
    let site = store.site_config().await?;
    priority
        .check_categories(&site.categories)
        .context("priority table does not match the site's categories")?;

    let openai = Arc::new(OpenAiClient::new((*http_client).clone(), &config.openai));
    if !openai.has_key() {
        tracing::warn!("OPENAI_API_KEY is not set; publishing runs will fail to rewrite items");
    }
    let images: Option<Arc<dyn ImageGenerator>> = (openai.has_key() && openai.images_enabled())
        .then(|| openai.clone() as Arc<dyn ImageGenerator>);

    let telegram: Option<Arc<dyn TelegramApi>> = config.telegram.bot_token.clone().map(|token| {
        Arc::new(HttpTelegramClient::new((*http_client).clone(), token)) as Arc<dyn TelegramApi>
    });
    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    if let Some(api) = &telegram {
        if config.telegram.admin_chat_ids.is_empty() {
            tracing::warn!("TELEGRAM_ADMIN_CHAT_IDS is empty; run summaries will not be sent");
        } else {
            sinks.push(Arc::new(TelegramSink::new(
                api.clone(),
                config.telegram.admin_chat_ids.clone(),
            )));
        }
    }

    let offset = config.site_offset();
    let pipeline = Arc::new(Pipeline::new(
        store.clone(),
        Arc::new(HttpSourceFetcher::new(http_client.clone())),
        openai.clone(),
        images,
        sinks,
        offset,
    ));
    let scheduler = Arc::new(PublishScheduler::new(
        &config.cron_schedule,
        store.clone(),
        pipeline,
        priority,
        offset,
    )?);

    Ok(Services {
        store,
        scheduler,
        writer: openai,
        telegram,
    })
}

async fn run_server(config: Config, no_scheduler: bool) -> Result<()> {
    let services = build_services(&config).await?;

    if no_scheduler {
        tracing::info!("Starting without the publish scheduler (--no-scheduler)");
    } else {
        services.scheduler.start().await;
    }

    let bot = services.telegram.clone().map(|api| {
        Arc::new(BotService::new(
            services.store.clone(),
            services.scheduler.clone(),
            services.writer.clone(),
            api,
            config.telegram.admin_chat_ids.clone(),
            config.openai.model.clone(),
            config.openai.api_key.is_some(),
        ))
    });
    if bot.is_none() {
        tracing::info!("TELEGRAM_BOT_TOKEN not set, bot disabled");
    }

    let port = config.port;
    let app_state = api::AppState {
        config: Arc::new(config),
        store: services.store,
        scheduler: services.scheduler,
        writer: services.writer,
        bot,
    };

    let app = api::create_app(app_state)
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(NewSentryLayer::<Request<Body>>::new_from_top());

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    println!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn run_once(config: Config, count: Option<u32>, bucket: Option<String>) -> Result<()> {
    let services = build_services(&config).await?;
    let report = services
        .scheduler
        .run_now(Trigger::Cli, bucket.as_deref(), count, Utc::now())
        .await?;
    let site = services.store.site_config().await?;
    println!("{}", report.summary(&site));
    Ok(())
}

fn print_buckets(config: &Config) -> Result<()> {
    let table = PriorityTable::load(config.priority_file.as_deref())?;
    let hour = site_hour(Utc::now(), config.site_offset());
    for bucket in &table.buckets {
        let marker = if bucket.contains(hour) { "*" } else { " " };
        println!(
            "{marker} {:<10} {}  {} per run",
            bucket.name,
            bucket.hours_label(),
            bucket.articles
        );
        for source in &bucket.sources {
            println!("      {}", source.label());
        }
    }
    Ok(())
}
