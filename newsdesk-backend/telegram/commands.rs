/// A parsed bot command. Arguments that fail to parse are kept as `None`
/// so handlers can answer with usage help.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Help,
    Status,
    Stats,
    Analytics,
    Fetch(Option<u32>),
    Articles(Option<usize>),
    Article(Option<String>),
    Delete(Option<String>),
    Clear,
    Budget,
    SetLimit(Option<u32>),
    SetBudget(Option<f64>),
    Pause,
    Resume,
    Priority,
    CronLogs,
    Config,
    TestAi,
    Unknown(String),
}

impl Command {
    /// Parse `/name[@BotName] [args]`. Returns `None` for plain text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let first = args.split_whitespace().next();

        let command = match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "status" => Command::Status,
            "stats" => Command::Stats,
            "analytics" => Command::Analytics,
            "fetch" => Command::Fetch(first.and_then(|a| a.parse().ok())),
            "articles" | "list" => Command::Articles(first.and_then(|a| a.parse().ok())),
            "article" => Command::Article(first.map(String::from)),
            "delete" => Command::Delete(first.map(String::from)),
            "clear" => Command::Clear,
            "budget" => Command::Budget,
            "setlimit" => Command::SetLimit(first.and_then(|a| a.parse().ok())),
            "setbudget" => Command::SetBudget(
                first
                    .map(|a| a.trim_start_matches('$'))
                    .and_then(|a| a.parse::<f64>().ok())
                    .filter(|v| v.is_finite() && *v >= 0.0),
            ),
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "priority" => Command::Priority,
            "cronlogs" | "logs" => Command::CronLogs,
            "config" => Command::Config,
            "testai" => Command::TestAi,
            other => Command::Unknown(other.to_string()),
        };
        Some(command)
    }

    /// Commands anyone may run, admin or not.
    pub fn is_public(&self) -> bool {
        matches!(self, Command::Start | Command::Help)
    }
}
