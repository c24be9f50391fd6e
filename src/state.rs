//! Check-in state - a single JSON document loaded and saved wholesale

use crate::config::Config;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckinStatus {
    Sent,
    Responded,
}

/// One sent prompt, keyed in the state by [`CheckinRecord::id`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub message_id: i64,
    pub time: String, // HH:MM
    pub date: String, // YYYY-MM-DD
    pub status: CheckinStatus,
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<String>,
}

impl CheckinRecord {
    pub fn new(message_id: i64, date: &str, time: &str) -> Self {
        Self {
            message_id,
            time: time.to_string(),
            date: date.to_string(),
            status: CheckinStatus::Sent,
            response: None,
            response_time: None,
        }
    }

    pub fn id(&self) -> String {
        checkin_id(&self.date, &self.time)
    }

    /// A second reply simply overwrites the first.
    pub fn mark_responded(&mut self, response: &str, at: &str) {
        self.status = CheckinStatus::Responded;
        self.response = Some(response.to_string());
        self.response_time = Some(at.to_string());
    }
}

/// "2024-01-01", "09:00" -> "2024-01-01_0900"
pub fn checkin_id(date: &str, time: &str) -> String {
    format!("{}_{}", date, time.replace(':', ""))
}

/// Whole persisted state.
///
/// `pending_responses` and `message_history` are no longer written to but are
/// kept so older state files survive a load/save cycle, as is any unknown key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub last_checkin_time: Option<String>,
    #[serde(default)]
    pub pending_responses: Vec<Value>,
    #[serde(default)]
    pub message_history: Vec<Value>,
    #[serde(default)]
    pub active_checkins: BTreeMap<String, CheckinRecord>,
    #[serde(default)]
    pub last_update_id: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateDocument {
    pub fn find_by_message_id(&self, message_id: i64) -> Option<(&String, &CheckinRecord)> {
        self.active_checkins
            .iter()
            .find(|(_, record)| record.message_id == message_id)
    }

    /// Insert a record under its derived id, returning the id
    pub fn insert(&mut self, record: CheckinRecord) -> String {
        let id = record.id();
        self.active_checkins.insert(id.clone(), record);
        id
    }

    pub fn checkins_on<'a>(
        &'a self,
        date: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a CheckinRecord)> {
        self.active_checkins
            .iter()
            .filter(move |(_, record)| record.date == date)
    }
}

/// Read-modify-write access to the state file. Holds no cache: every
/// operation goes back to disk.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(config: &Config) -> Self {
        Self::at(&config.state_file)
    }

    pub fn at(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state, surfacing read and parse errors
    pub fn try_load(&self) -> Result<StateDocument> {
        if !self.path.exists() {
            return Ok(StateDocument::default());
        }

        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load the state, falling back to an empty document on any error.
    /// Prior state is lost in that case.
    pub fn load(&self) -> StateDocument {
        match self.try_load() {
            Ok(state) => state,
            Err(e) => {
                error!("Error loading state from {}: {}", self.path.display(), e);
                StateDocument::default()
            }
        }
    }

    /// Save state to disk atomically
    pub fn save(&self, state: &StateDocument) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // Write to temp file in same directory (for atomic rename)
        let mut temp = NamedTempFile::new_in(parent)?;
        let json = serde_json::to_string_pretty(state)?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        debug!("State saved to {}", self.path.display());
        Ok(())
    }

    /// Load, apply `f`, save. Returns whatever `f` returns.
    pub fn update<T>(&self, f: impl FnOnce(&mut StateDocument) -> T) -> Result<T> {
        let mut state = self.load();
        let out = f(&mut state);
        self.save(&state)?;
        Ok(out)
    }
}
