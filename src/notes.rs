//! Daily note files
//!
//! One markdown file per date under the memory directory. Each check-in gets a
//! heading carrying its time and message id followed by fixed-format lines;
//! only the "User response" line is rewritten after the entry is created.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::{CheckinRecord, StateStore};
use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

pub const RESPONSE_PLACEHOLDER: &str = "[Awaiting reply]";

const RESPONSE_MARKER: &str = "**User response:**";

/// Lines searched for the response line, counting the heading itself
const RESPONSE_WINDOW: usize = 10;

static HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^### (\d{1,2}:\d{2}) Check-in \(Message ID: (-?\d+)\)")
        .expect("Invalid heading regex")
});

/// A parsed `### HH:MM Check-in (Message ID: N)` line
#[derive(Debug, Clone, PartialEq)]
pub struct NoteHeading {
    pub time: String,
    pub message_id: i64,
}

pub fn parse_heading(line: &str) -> Option<NoteHeading> {
    let caps = HEADING.captures(line.trim_end())?;
    let time = caps.get(1)?.as_str().to_string();
    let message_id = caps.get(2)?.as_str().parse().ok()?;
    Some(NoteHeading { time, message_id })
}

pub fn file_header(date: &str) -> String {
    format!("# {}\n\n## Check-ins\n\n", date)
}

pub fn render_entry(time: &str, message_id: i64) -> String {
    format!(
        "### {time} Check-in (Message ID: {message_id})\n\
         - **Question sent at:** {time}\n\
         - **User response:** {RESPONSE_PLACEHOLDER}\n\
         - **Progress:** \n\
         - **Next actions:** \n\n"
    )
}

pub fn response_line(text: &str) -> String {
    // Keep the entry on one line so later replies still find it
    let flat = text.lines().map(str::trim_end).collect::<Vec<_>>().join(" ");
    format!("- {} {}", RESPONSE_MARKER, flat)
}

/// Replace the response line of the entry for (`time`, `message_id`).
/// Every other line, terminators included, is returned untouched.
pub fn patch_response(content: &str, time: &str, message_id: i64, text: &str) -> Result<String> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();

    let heading_idx = lines
        .iter()
        .position(|line| {
            parse_heading(line)
                .map(|h| h.time == time && h.message_id == message_id)
                .unwrap_or(false)
        })
        .ok_or_else(|| Error::NoteEntryNotFound {
            time: time.to_string(),
            message_id,
        })?;

    let end = (heading_idx + RESPONSE_WINDOW).min(lines.len());
    let target = (heading_idx..end)
        .find(|&j| lines[j].contains(RESPONSE_MARKER))
        .ok_or_else(|| Error::PlaceholderNotFound {
            time: time.to_string(),
            message_id,
        })?;

    let old = lines[target];
    let terminator = if old.ends_with("\r\n") {
        "\r\n"
    } else if old.ends_with('\n') {
        "\n"
    } else {
        ""
    };
    let mut patched = String::with_capacity(content.len() + text.len());
    for (i, line) in lines.iter().enumerate() {
        if i == target {
            patched.push_str(&response_line(text));
            patched.push_str(terminator);
        } else {
            patched.push_str(line);
        }
    }

    Ok(patched)
}

/// The directory of `{YYYY-MM-DD}.md` files
#[derive(Debug, Clone)]
pub struct DailyNotes {
    dir: PathBuf,
}

impl DailyNotes {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.memory_dir.clone(),
        }
    }

    pub fn path_for(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{}.md", date))
    }

    /// Append a check-in entry, creating the day's file with its header first
    pub fn append_checkin(&self, date: &str, time: &str, message_id: i64) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(date);

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            file.write_all(file_header(date).as_bytes())?;
        }
        file.write_all(render_entry(time, message_id).as_bytes())?;

        info!("Updated daily note: {}", path.display());
        Ok(path)
    }

    /// Rewrite the response line of `record`'s entry in place
    pub fn write_response(&self, record: &CheckinRecord, text: &str) -> Result<PathBuf> {
        let path = self.path_for(&record.date);
        if !path.exists() {
            return Err(Error::NoteNotFound(path));
        }

        let content = fs::read_to_string(&path)?;
        let patched = patch_response(&content, &record.time, record.message_id, text)?;
        fs::write(&path, patched)?;
        Ok(path)
    }

    /// Headings present in the day's file, in file order
    pub fn headings(&self, date: &str) -> Result<Vec<NoteHeading>> {
        let path = self.path_for(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(content.lines().filter_map(parse_heading).collect())
    }
}

/// Applies a reply to both the note file and the state
#[derive(Debug, Clone)]
pub struct NoteUpdater {
    notes: DailyNotes,
    store: StateStore,
}

impl NoteUpdater {
    pub fn new(config: &Config) -> Self {
        Self {
            notes: DailyNotes::new(config),
            store: StateStore::new(config),
        }
    }

    /// Patch the note entry for `record` and mark it responded.
    ///
    /// The stored record under `record.id()` must carry the same message id;
    /// a newer send in the same minute replaces the older record, and replies
    /// to the older prompt are then refused. A missing record or note entry
    /// leaves both files untouched. A failed state save after the note was
    /// patched leaves the note patched and the record still `sent`.
    pub fn log_response(&self, record: &CheckinRecord, text: &str) -> Result<CheckinRecord> {
        let mut state = self.store.load();
        let id = record.id();
        let stored = match state.active_checkins.get_mut(&id) {
            Some(stored) if stored.message_id == record.message_id => stored,
            _ => {
                warn!(
                    "No check-in data found for {} (message {})",
                    id, record.message_id
                );
                return Err(Error::CheckinNotFound(id));
            }
        };

        let path = match self.notes.write_response(record, text) {
            Ok(path) => path,
            Err(e) => {
                warn!("Could not update note for check-in {}: {}", id, e);
                return Err(e);
            }
        };

        let now = Local::now().format("%H:%M").to_string();
        stored.mark_responded(text, &now);
        let updated = stored.clone();
        self.store.save(&state)?;

        info!(
            "Logged response for check-in at {} in {}: {}",
            record.time,
            path.display(),
            text.chars().take(50).collect::<String>()
        );
        Ok(updated)
    }

    /// Same as [`log_response`](Self::log_response), looking the record up by
    /// the id of the prompt message
    pub fn log_reply(&self, message_id: i64, text: &str) -> Result<CheckinRecord> {
        let state = self.store.load();
        let record = match state.find_by_message_id(message_id) {
            Some((_, record)) => record.clone(),
            None => {
                warn!("No check-in found for message ID: {}", message_id);
                return Err(Error::CheckinNotFound(format!("message {}", message_id)));
            }
        };
        self.log_response(&record, text)
    }
}
