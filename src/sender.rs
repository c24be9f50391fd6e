//! Prompt sender - sends a check-in and records it in state and daily notes

use crate::config::{CheckinType, Config};
use crate::error::Result;
use crate::notes::DailyNotes;
use crate::state::{CheckinRecord, StateStore};
use crate::telegram::BotApi;
use chrono::{Local, NaiveDateTime, Timelike};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of a successful send
#[derive(Debug, Clone, PartialEq)]
pub struct SentCheckin {
    pub checkin_id: String,
    pub message_id: i64,
    pub note_path: PathBuf,
}

/// Build the outgoing text. A custom message replaces the time-of-day template.
pub fn compose_message(custom: Option<&str>, now: NaiveDateTime) -> String {
    let time = now.format("%H:%M");

    match custom {
        Some(text) => format!("📋 {}\n\nTime: {}", text, time),
        None => {
            let prompt = CheckinType::for_hour(now.hour()).prompt();
            format!(
                "{prompt}\n\n\
                 ⏰ Time: {time}\n\n\
                 **What have you accomplished since last check-in?**\n\
                 **What's next on your list?**\n\n\
                 Reply to this message and I'll log your response automatically!"
            )
        }
    }
}

pub struct CheckinSender {
    api: Arc<dyn BotApi>,
    store: StateStore,
    notes: DailyNotes,
}

impl CheckinSender {
    pub fn new(config: &Config, api: Arc<dyn BotApi>) -> Self {
        Self {
            api,
            store: StateStore::new(config),
            notes: DailyNotes::new(config),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.store.path().to_path_buf()
    }

    /// Send a check-in stamped with the current local time
    pub async fn send_checkin(&self, custom: Option<&str>) -> Result<SentCheckin> {
        self.send_checkin_at(custom, Local::now().naive_local()).await
    }

    /// Send a check-in stamped with `now`.
    ///
    /// Nothing is written unless the platform acknowledges the message.
    /// Failures are not retried; the scheduler runs us again next slot.
    pub async fn send_checkin_at(
        &self,
        custom: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<SentCheckin> {
        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%H:%M").to_string();
        let text = compose_message(custom, now);

        let message_id = match self.api.send_message(&text, None).await {
            Ok(id) => id,
            Err(e) => {
                error!("Error sending check-in: {}", e);
                return Err(e);
            }
        };
        info!("Check-in sent successfully. Message ID: {}", message_id);

        let mut state = self.store.load();
        let checkin_id = state.insert(CheckinRecord::new(message_id, &date, &time));
        state.last_checkin_time = Some(format!("{} {}", date, time));

        let note_path = self.notes.append_checkin(&date, &time, message_id)?;
        self.store.save(&state)?;

        Ok(SentCheckin {
            checkin_id,
            message_id,
            note_path,
        })
    }
}
