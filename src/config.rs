//! Configuration, paths and check-in prompts

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// All configurable paths and constants
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub workspace_root: PathBuf,
    pub memory_dir: PathBuf,
    pub state_file: PathBuf,
    pub log_file: PathBuf,
    pub checkin_times: Vec<String>,
    pub send_timeout: Duration,
    pub poll_timeout: Duration,
    pub long_poll_secs: u64,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub ack_preview_chars: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"));
        Self::rooted_at(&home.join(".nanobot/workspace"))
    }
}

impl Config {
    fn rooted_at(workspace_root: &Path) -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: TELEGRAM_API_BASE.to_string(),
            memory_dir: workspace_root.join("memory"),
            state_file: workspace_root.join("subagents/checkin_state.json"),
            log_file: workspace_root.join("subagents/checkin_bot.log"),
            workspace_root: workspace_root.to_path_buf(),
            checkin_times: CHECKIN_TIMES.iter().map(|t| t.to_string()).collect(),
            send_timeout: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(35),
            long_poll_secs: 30,
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            ack_preview_chars: 100,
        }
    }

    /// Defaults overlaid with `CHECKIN_*` environment variables.
    ///
    /// Never fails: anything unset keeps its default. Paths derived from the
    /// workspace root follow `CHECKIN_WORKSPACE` unless overridden themselves.
    pub fn from_env() -> Self {
        let mut config = match env_var("CHECKIN_WORKSPACE") {
            Some(root) => Self::rooted_at(Path::new(&root)),
            None => Self::default(),
        };

        if let Some(token) = env_var("CHECKIN_BOT_TOKEN") {
            config.bot_token = token;
        }
        if let Some(chat_id) = env_var("CHECKIN_CHAT_ID") {
            config.chat_id = chat_id;
        }
        if let Some(base) = env_var("CHECKIN_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(dir) = env_var("CHECKIN_MEMORY_DIR") {
            config.memory_dir = PathBuf::from(dir);
        }
        if let Some(file) = env_var("CHECKIN_STATE_FILE") {
            config.state_file = PathBuf::from(file);
        }
        if let Some(file) = env_var("CHECKIN_LOG_FILE") {
            config.log_file = PathBuf::from(file);
        }

        config
    }

    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        let mut config = Self::rooted_at(temp_dir);
        config.bot_token = "test-token".to_string();
        config.chat_id = "457681374".to_string();
        config.api_base = "http://127.0.0.1:9".to_string();
        config.poll_interval = Duration::from_millis(10);
        config.error_backoff = Duration::from_millis(50);
        config
    }

    /// Whether credentials are present at all
    pub fn has_credentials(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Check-in schedule (24-hour local time)
pub const CHECKIN_TIMES: &[&str] = &["09:00", "12:00", "15:00", "18:00", "21:00"];

/// Time-of-day band that selects the prompt template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckinType {
    Morning,
    Midday,
    Afternoon,
    Evening,
    Night,
}

impl CheckinType {
    pub const ALL: [CheckinType; 5] = [
        CheckinType::Morning,
        CheckinType::Midday,
        CheckinType::Afternoon,
        CheckinType::Evening,
        CheckinType::Night,
    ];

    /// [6,10) morning, [10,14) midday, [14,17) afternoon, [17,21) evening, else night
    pub fn for_hour(hour: u32) -> Self {
        match hour {
            6..=9 => CheckinType::Morning,
            10..=13 => CheckinType::Midday,
            14..=16 => CheckinType::Afternoon,
            17..=20 => CheckinType::Evening,
            _ => CheckinType::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinType::Morning => "morning",
            CheckinType::Midday => "midday",
            CheckinType::Afternoon => "afternoon",
            CheckinType::Evening => "evening",
            CheckinType::Night => "night",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            CheckinType::Morning => "🌅 Good morning! What are your top priorities for today?",
            CheckinType::Midday => "☀️ Midday check-in! How's your progress going?",
            CheckinType::Afternoon => "🌇 Afternoon check-in! Any updates or blockers?",
            CheckinType::Evening => "🌙 Evening check-in! What did you accomplish today?",
            CheckinType::Night => "🌃 Final check-in! Any reflections for tomorrow?",
        }
    }
}

impl std::fmt::Display for CheckinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
