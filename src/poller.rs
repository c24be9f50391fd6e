//! Reply poller - long-polls for replies to check-in prompts and logs them
//!
//! One sequential loop: fetch updates past the watermark, match replies to
//! pending check-ins, patch notes, acknowledge, persist the watermark, sleep.

use crate::config::Config;
use crate::error::Result;
use crate::notes::NoteUpdater;
use crate::state::StateStore;
use crate::telegram::{BotApi, Message};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Whether a parent message looks like one of our prompts
pub fn is_checkin_prompt(text: &str) -> bool {
    text.to_lowercase().contains("check-in")
}

/// First `max_chars` characters, with "..." appended when cut
pub fn truncate_response(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

pub fn acknowledgment_text(response: &str, max_chars: usize) -> String {
    format!(
        "✅ Check-in response logged!\n\n\
         Your update has been saved to your daily notes.\n\n\
         **Response:** {}\n\n\
         Continue with your work! The next check-in will be in 3 hours.",
        truncate_response(response, max_chars)
    )
}

pub struct ReplyPoller {
    config: Config,
    api: Arc<dyn BotApi>,
    store: StateStore,
    updater: NoteUpdater,
    last_update_id: i64,
}

impl ReplyPoller {
    /// Create a poller resuming from the watermark stored in state
    pub fn new(config: &Config, api: Arc<dyn BotApi>) -> Self {
        let store = StateStore::new(config);
        let last_update_id = store.load().last_update_id;

        Self {
            config: config.clone(),
            api,
            updater: NoteUpdater::new(config),
            store,
            last_update_id,
        }
    }

    pub fn watermark(&self) -> i64 {
        self.last_update_id
    }

    /// One iteration: fetch, dispatch, persist the watermark.
    /// Returns how many check-in responses were logged.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let updates = match self
            .api
            .get_updates(self.last_update_id + 1, self.config.long_poll_secs)
            .await
        {
            Ok(updates) => updates,
            Err(e) => {
                error!("Failed to fetch updates: {}", e);
                Vec::new()
            }
        };

        let mut logged = 0;
        for update in &updates {
            self.last_update_id = self.last_update_id.max(update.update_id);

            if let Some(message) = &update.message {
                if self.handle_message(message).await {
                    logged += 1;
                }
            }
        }

        self.persist_watermark()?;
        Ok(logged)
    }

    /// Route one incoming message. Returns true when it was logged as a
    /// check-in response.
    pub async fn handle_message(&self, message: &Message) -> bool {
        if message.chat.id.to_string() != self.config.chat_id {
            debug!("Ignoring message from chat {}", message.chat.id);
            return false;
        }

        let text = match message.text.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return false,
        };

        let parent = match &message.reply_to_message {
            Some(parent) => parent,
            None => return false,
        };
        if !is_checkin_prompt(parent.text.as_deref().unwrap_or("")) {
            return false;
        }

        info!(
            "Check-in response received: {}",
            text.chars().take(50).collect::<String>()
        );

        let state = self.store.load();
        let record = match state.find_by_message_id(parent.message_id) {
            Some((_, record)) => record.clone(),
            None => {
                debug!("No check-in recorded for message {}", parent.message_id);
                return false;
            }
        };

        if let Err(e) = self.updater.log_response(&record, text) {
            warn!("Response for check-in {} not logged: {}", record.id(), e);
            return false;
        }

        self.send_acknowledgment(message.message_id, text).await;
        true
    }

    async fn send_acknowledgment(&self, reply_to: i64, response: &str) {
        let ack = acknowledgment_text(response, self.config.ack_preview_chars);
        match self.api.send_message(&ack, Some(reply_to)).await {
            Ok(_) => info!("Acknowledgment sent successfully"),
            Err(e) => error!("Error sending acknowledgment: {}", e),
        }
    }

    fn persist_watermark(&self) -> Result<()> {
        let watermark = self.last_update_id;
        self.store.update(|state| state.last_update_id = watermark)
    }

    /// Pause before the next iteration: the poll interval after success, the
    /// error backoff after a failed iteration
    pub fn delay_after(&self, outcome: &Result<usize>) -> Duration {
        match outcome {
            Ok(_) => self.config.poll_interval,
            Err(e) => {
                error!("Error in polling loop: {}", e);
                self.config.error_backoff
            }
        }
    }

    /// Poll until Ctrl-C. Errors are logged and followed by a backoff.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Starting check-in polling service for chat {} from update {}",
            self.config.chat_id, self.last_update_id
        );

        loop {
            let outcome = self.poll_once().await;
            let delay = self.delay_after(&outcome);

            if wait_or_interrupt(delay).await {
                info!("Polling service stopped by user");
                return Ok(());
            }
        }
    }
}

/// Sleep for `delay`; true if interrupted first
async fn wait_or_interrupt(delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::notes::DailyNotes;
    use crate::state::{CheckinRecord, CheckinStatus};
    use crate::telegram::{Chat, ReplyTo, Update};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const CHAT: i64 = 457681374;

    #[derive(Default)]
    struct ScriptedApi {
        batches: Mutex<VecDeque<Result<Vec<Update>>>>,
        offsets: Mutex<Vec<i64>>,
        sent: Mutex<Vec<(String, Option<i64>)>>,
    }

    impl ScriptedApi {
        fn with_batches(batches: Vec<Result<Vec<Update>>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl BotApi for ScriptedApi {
        async fn send_message(&self, text: &str, reply_to: Option<i64>) -> Result<i64> {
            self.sent.lock().unwrap().push((text.to_string(), reply_to));
            Ok(900)
        }

        async fn get_updates(&self, offset: i64, _timeout_secs: u64) -> Result<Vec<Update>> {
            self.offsets.lock().unwrap().push(offset);
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn reply(update_id: i64, chat: i64, text: &str, parent_id: i64, parent_text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: update_id + 1000,
                chat: Chat { id: chat },
                text: Some(text.to_string()),
                date: 1704099900,
                reply_to_message: Some(ReplyTo {
                    message_id: parent_id,
                    text: Some(parent_text.to_string()),
                }),
            }),
        }
    }

    fn seed_checkin(config: &Config, message_id: i64) {
        StateStore::new(config)
            .update(|s| s.insert(CheckinRecord::new(message_id, "2024-01-01", "09:00")))
            .unwrap();
        DailyNotes::new(config)
            .append_checkin("2024-01-01", "09:00", message_id)
            .unwrap();
    }

    #[test]
    fn test_is_checkin_prompt() {
        assert!(is_checkin_prompt("☀️ Midday check-in! How's it going?"));
        assert!(is_checkin_prompt("Final CHECK-IN"));
        assert!(!is_checkin_prompt("Good morning!"));
    }

    #[test]
    fn test_truncate_response() {
        assert_eq!(truncate_response("short", 100), "short");
        let long = "a".repeat(150);
        let cut = truncate_response(&long, 100);
        assert_eq!(cut.len(), 103);
        assert!(cut.ends_with("..."));
        // Counted in characters, not bytes
        let emoji = "✅".repeat(100);
        assert_eq!(truncate_response(&emoji, 100), emoji);
    }

    #[test]
    fn test_acknowledgment_text() {
        let ack = acknowledgment_text("Finished the report", 100);
        assert!(ack.contains("**Response:** Finished the report"));
        assert!(ack.contains("next check-in will be in 3 hours"));
    }

    #[tokio::test]
    async fn test_reply_is_logged_and_acknowledged() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        seed_checkin(&config, 55);

        let api = ScriptedApi::with_batches(vec![Ok(vec![reply(
            10,
            CHAT,
            "Finished the report",
            55,
            "Reply to this check-in",
        )])]);
        let mut poller = ReplyPoller::new(&config, api.clone());

        assert_eq!(poller.poll_once().await.unwrap(), 1);
        assert_eq!(poller.watermark(), 10);

        let record = &StateStore::new(&config).load().active_checkins["2024-01-01_0900"];
        assert_eq!(record.status, CheckinStatus::Responded);
        assert_eq!(record.response.as_deref(), Some("Finished the report"));

        let sent = api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, Some(1010));
    }

    #[tokio::test]
    async fn test_other_chat_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        seed_checkin(&config, 55);

        let api = ScriptedApi::with_batches(vec![Ok(vec![reply(3, 42, "hi", 55, "check-in")])]);
        let mut poller = ReplyPoller::new(&config, api.clone());

        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert!(api.sent.lock().unwrap().is_empty());
        assert_eq!(StateStore::new(&config).load().last_update_id, 3);
    }

    #[tokio::test]
    async fn test_non_checkin_parent_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        seed_checkin(&config, 55);

        let api = ScriptedApi::with_batches(vec![Ok(vec![reply(4, CHAT, "lol", 55, "a joke")])]);
        let mut poller = ReplyPoller::new(&config, api);

        assert_eq!(poller.poll_once().await.unwrap(), 0);
        let record = &StateStore::new(&config).load().active_checkins["2024-01-01_0900"];
        assert_eq!(record.status, CheckinStatus::Sent);
    }

    #[tokio::test]
    async fn test_unknown_parent_dropped() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        seed_checkin(&config, 55);
        let note = config.memory_dir.join("2024-01-01.md");
        let before = fs::read_to_string(&note).unwrap();

        let api =
            ScriptedApi::with_batches(vec![Ok(vec![reply(5, CHAT, "hello", 77, "check-in")])]);
        let mut poller = ReplyPoller::new(&config, api.clone());

        assert_eq!(poller.poll_once().await.unwrap(), 0);
        assert!(api.sent.lock().unwrap().is_empty());
        assert_eq!(fs::read_to_string(&note).unwrap(), before);
    }

    #[tokio::test]
    async fn test_watermark_advances_and_resumes() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());

        let api = ScriptedApi::with_batches(vec![
            Ok(vec![
                Update {
                    update_id: 20,
                    message: None,
                },
                Update {
                    update_id: 22,
                    message: None,
                },
            ]),
            Err(Error::Api("HTTP 502 Bad Gateway".to_string())),
        ]);
        let mut poller = ReplyPoller::new(&config, api.clone());

        poller.poll_once().await.unwrap();
        assert_eq!(poller.watermark(), 22);

        // A failed fetch is an empty batch; the watermark holds
        poller.poll_once().await.unwrap();
        assert_eq!(poller.watermark(), 22);
        assert_eq!(*api.offsets.lock().unwrap(), vec![1, 23]);

        let resumed = ReplyPoller::new(&config, api.clone());
        assert_eq!(resumed.watermark(), 22);
    }

    #[tokio::test]
    async fn test_delay_after_success_is_poll_interval() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::for_test(temp_dir.path());
        let mut poller = ReplyPoller::new(&config, ScriptedApi::with_batches(Vec::new()));

        let outcome = poller.poll_once().await;
        assert!(outcome.is_ok());
        assert_eq!(poller.delay_after(&outcome), config.poll_interval);
    }

    #[tokio::test]
    async fn test_failed_watermark_save_backs_off() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::for_test(temp_dir.path());
        // A non-empty directory where the state file should be: saving fails
        config.state_file = temp_dir.path().join("state-is-a-dir");
        fs::create_dir_all(config.state_file.join("occupied")).unwrap();

        let api = ScriptedApi::with_batches(vec![Ok(vec![Update {
            update_id: 8,
            message: None,
        }])]);
        let mut poller = ReplyPoller::new(&config, api);

        let outcome = poller.poll_once().await;
        assert!(outcome.is_err());
        assert_eq!(poller.delay_after(&outcome), config.error_backoff);
        assert_ne!(config.error_backoff, config.poll_interval);
    }
}
