pub mod article;
pub mod cron_log;
pub mod site;
pub mod stats;

pub use article::{Article, ArticleImage};
pub use cron_log::{CronLog, RunStatus, Trigger};
pub use site::{SiteConfig, Strategy};
pub use stats::Stats;
