use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_CRON_LOGS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Cron,
    Manual,
    Forced,
    Cli,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Cron => "cron",
            Trigger::Manual => "manual",
            Trigger::Forced => "forced",
            Trigger::Cli => "cli",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronLog {
    pub id: String,
    pub trigger: Trigger,
    pub bucket: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub requested: usize,
    pub published: usize,
    #[serde(default)]
    pub article_ids: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub note: Option<String>,
}

impl CronLog {
    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}
