//! Check-in Bot - Rust Telegram check-in logger
//!
//! Sends scheduled check-in prompts to a single Telegram chat, waits for the
//! replies, and records prompt and reply in per-day markdown notes.

pub mod config;
pub mod error;
pub mod notes;
pub mod poller;
pub mod sender;
pub mod state;
pub mod telegram;

pub use error::{Error, Result};
