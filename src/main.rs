//! Check-in Bot - Rust implementation
//!
//! CLI for sending check-in prompts and running the reply poller.

use clap::{Parser, Subcommand};
use checkin_bot::config::Config;
use checkin_bot::notes::DailyNotes;
use checkin_bot::poller::ReplyPoller;
use checkin_bot::sender::CheckinSender;
use checkin_bot::state::{CheckinStatus, StateStore};
use checkin_bot::telegram::{BotApi, TelegramClient};
use checkin_bot::Result;
use std::fs;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Check-in Bot - periodic Telegram check-ins logged to daily notes
#[derive(Parser)]
#[command(name = "checkin-bot")]
#[command(about = "Send check-in prompts and log replies into daily notes")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Send the time-of-day check-in (for the scheduler)
    #[arg(long)]
    scheduled: bool,

    /// Send a custom check-in message
    #[arg(long, conflicts_with = "scheduled")]
    message: Option<String>,

    /// Send the default check-in and print diagnostics
    #[arg(long)]
    test: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll for replies and log them (runs until Ctrl-C)
    Poll,

    /// Show recorded check-ins
    Status {
        /// Only show check-ins for this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Print crontab lines for the check-in times
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = Config::from_env();
    init_logging(&config);

    if !config.has_credentials() {
        warn!("CHECKIN_BOT_TOKEN or CHECKIN_CHAT_ID is not set");
    }

    match cli.command {
        Some(Commands::Poll) => cmd_poll(&config).await,
        Some(Commands::Status { date }) => cmd_status(&config, date.as_deref()),
        Some(Commands::Schedule) => cmd_schedule(&config),
        None => {
            if cli.scheduled {
                cmd_scheduled(&config).await
            } else if let Some(message) = cli.message {
                cmd_custom(&config, &message).await
            } else {
                if cli.test {
                    info!("Running check-in test via command line");
                }
                cmd_test(&config).await
            }
        }
    }
}

/// Log to stderr and, if it can be opened, the configured log file
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_file = config
        .log_file
        .parent()
        .map(|dir| fs::create_dir_all(dir))
        .transpose()
        .and_then(|_| {
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log_file)
        });

    let file_layer = match log_file {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        ),
        Err(e) => {
            eprintln!("Could not open log file {}: {}", config.log_file.display(), e);
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn sender(config: &Config) -> CheckinSender {
    let api: Arc<dyn BotApi> = Arc::new(TelegramClient::new(config));
    CheckinSender::new(config, api)
}

// ============================================================================
// CLI Commands
// ============================================================================

async fn cmd_scheduled(config: &Config) -> Result<()> {
    info!("Running scheduled check-in via command line");

    match sender(config).send_checkin(None).await {
        Ok(sent) => {
            println!("✓ Scheduled check-in sent. Message ID: {}", sent.message_id);
            info!("Scheduled check-in completed. Message ID: {}", sent.message_id);
        }
        Err(_) => {
            println!("✗ Failed to send scheduled check-in");
            error!("Failed to send scheduled check-in");
        }
    }
    Ok(())
}

async fn cmd_custom(config: &Config, message: &str) -> Result<()> {
    match sender(config).send_checkin(Some(message)).await {
        Ok(sent) => {
            println!("✓ Custom check-in sent. Message ID: {}", sent.message_id);
            info!("Custom check-in sent. Message ID: {}", sent.message_id);
        }
        Err(_) => {
            println!("✗ Failed to send custom check-in");
            error!("Failed to send custom check-in");
        }
    }
    Ok(())
}

async fn cmd_test(config: &Config) -> Result<()> {
    println!("Testing check-in bot...");
    let sender = sender(config);

    match sender.send_checkin(None).await {
        Ok(sent) => {
            println!("✓ Check-in sent successfully! Message ID: {}", sent.message_id);
            println!("✓ State saved to: {}", sender.state_path().display());
            println!("✓ Daily note updated: {}", sent.note_path.display());
        }
        Err(e) => {
            println!("✗ Failed to send check-in: {}", e);
            println!("Please check:");
            println!("1. Is CHECKIN_BOT_TOKEN set correctly?");
            println!("2. Is the bot token valid?");
            println!("3. Is the chat ID correct?");
        }
    }
    Ok(())
}

async fn cmd_poll(config: &Config) -> Result<()> {
    println!("Starting Check-in Polling Service...");
    println!("Chat ID: {}", config.chat_id);
    println!("State file: {}", config.state_file.display());
    println!("Log file: {}", config.log_file.display());
    println!("\nPress Ctrl+C to stop\n");

    let api: Arc<dyn BotApi> = Arc::new(TelegramClient::new(config));
    let mut poller = ReplyPoller::new(config, api);
    poller.run().await
}

fn cmd_status(config: &Config, date: Option<&str>) -> Result<()> {
    let state = StateStore::new(config).load();

    let checkins: Vec<_> = match date {
        Some(d) => state.checkins_on(d).collect(),
        None => state.active_checkins.iter().collect(),
    };

    if checkins.is_empty() {
        println!("No check-ins recorded");
    } else {
        println!("Check-ins:");
        for (id, record) in checkins {
            let status = match record.status {
                CheckinStatus::Sent => "sent",
                CheckinStatus::Responded => "responded",
            };
            let response = record
                .response
                .as_deref()
                .map(|r| r.chars().take(60).collect::<String>())
                .unwrap_or_default();
            println!(
                "  {}  message {}  {:<9}  {}",
                id, record.message_id, status, response
            );
        }
    }

    // Entries in the day's note that no record answers to can never be filled in
    if let Some(d) = date {
        let orphans: Vec<_> = DailyNotes::new(config)
            .headings(d)?
            .into_iter()
            .filter(|h| {
                state
                    .find_by_message_id(h.message_id)
                    .map(|(_, record)| record.time != h.time || record.date != d)
                    .unwrap_or(true)
            })
            .collect();

        if !orphans.is_empty() {
            println!("Note entries without a check-in record:");
            for heading in orphans {
                println!("  {}  message {}", heading.time, heading.message_id);
            }
        }
    }

    println!("Last update ID: {}", state.last_update_id);
    Ok(())
}

fn cmd_schedule(config: &Config) -> Result<()> {
    let exe = std::env::current_exe()?;

    println!("# checkin-bot schedule (local time)");
    for time in &config.checkin_times {
        match cron_fields(time) {
            Some((hour, minute)) => {
                println!("{} {} * * * {} --scheduled", minute, hour, exe.display())
            }
            None => warn!("Skipping malformed check-in time '{}'", time),
        }
    }
    Ok(())
}

/// "09:05" -> (9, 5)
fn cron_fields(time: &str) -> Option<(u32, u32)> {
    let (h, m) = time.split_once(':')?;
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}
