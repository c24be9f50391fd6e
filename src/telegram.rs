//! Telegram Bot API client
//!
//! The [`BotApi`] trait is the seam between the check-in logic and the
//! messaging platform; [`TelegramClient`] is the HTTP implementation.

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Operations the bot needs from the messaging platform.
/// Implementations are bound to a single chat.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Send a Markdown message to the chat, returning the new message id
    async fn send_message(&self, text: &str, reply_to: Option<i64>) -> Result<i64>;

    /// Long-poll for updates with `update_id >= offset`
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>>;
}

/// Envelope every Bot API call answers with
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> Result<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            (_, _) => Err(Error::Api(
                self.description
                    .unwrap_or_else(|| "response not ok".to_string()),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub reply_to_message: Option<ReplyTo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// The parent of a reply. Only the fields the poller reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyTo {
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct SendMessageRequest<'a> {
    pub chat_id: &'a str,
    pub text: &'a str,
    pub parse_mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

/// HTTP client for `https://api.telegram.org/bot{token}/...`
pub struct TelegramClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    send_timeout: Duration,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            send_timeout: config.send_timeout,
            poll_timeout: config.poll_timeout,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn send_message(&self, text: &str, reply_to: Option<i64>) -> Result<i64> {
        let body = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
            reply_to_message_id: reply_to,
        };

        // Telegram reports most failures as `ok: false` with a 4xx status,
        // so the body is parsed regardless of status.
        let response: ApiResponse<SentMessage> = self
            .http
            .post(self.method_url("sendMessage"))
            .timeout(self.send_timeout)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        let sent = response.into_result()?;
        debug!("sendMessage ok, message_id {}", sent.message_id);
        Ok(sent.message_id)
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let response = self
            .http
            .get(self.method_url("getUpdates"))
            .timeout(self.poll_timeout)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout_secs.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Api(format!("HTTP {}", status)));
        }

        let body: ApiResponse<Vec<Update>> = response.json().await?;
        body.into_result()
    }
}
