//! Error types for checkin-bot

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),

    #[error("Check-in not found: {0}")]
    CheckinNotFound(String),

    #[error("Daily note not found: {0}")]
    NoteNotFound(PathBuf),

    #[error("No note entry for {time} check-in (message {message_id})")]
    NoteEntryNotFound { time: String, message_id: i64 },

    #[error("No response line under {time} check-in (message {message_id})")]
    PlaceholderNotFound { time: String, message_id: i64 },
}

pub type Result<T> = std::result::Result<T, Error>;
