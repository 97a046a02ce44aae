//! Per-user conversation log.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Speaker roles for a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
}

/// Message in a chat exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Best-effort conversation persistence used by the dispatcher.
///
/// Failures are reported but never fatal; callers log them and carry on with
/// an empty or unsaved history.
pub trait ConversationStore: Send + Sync {
    /// Replace the previous-session history with `username`'s stored turns.
    fn load_history(&self, username: &str) -> Result<()>;
    /// Persist the current-session turns and forget them.
    fn dump_history(&self, username: Option<&str>) -> Result<()>;
    /// Append a turn to the current session.
    fn record(&self, message: Message);
    /// Previous-session turns followed by the current ones.
    fn history(&self) -> Vec<Message>;
    /// Every username with a stored conversation.
    fn known_users(&self) -> Result<Vec<String>>;
}

#[derive(Default)]
struct Session {
    previous: Vec<Message>,
    current: Vec<Message>,
}

impl Session {
    fn append_or_new(&mut self, message: Message) {
        if let Some(last) = self.current.last_mut() {
            if last.role == message.role {
                last.content.push(' ');
                last.content.push_str(&message.content);
                return;
            }
        }
        self.current.push(message);
    }
}

type Database = BTreeMap<String, Vec<Message>>;

/// JSON-file conversation log.
///
/// Known users live in one file mapping username to turns; sessions with an
/// unidentified speaker are appended to a separate file.
pub struct JsonConversationStore {
    db_path: PathBuf,
    unknown_path: PathBuf,
    session: Mutex<Session>,
}

impl JsonConversationStore {
    pub fn new(db_path: impl Into<PathBuf>, unknown_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            unknown_path: unknown_path.into(),
            session: Mutex::new(Session::default()),
        }
    }

    fn session(&self) -> std::sync::MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_db(&self) -> Result<Database> {
        read_json(&self.db_path)
    }
}

fn read_json<T: Default + for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(text) if text.trim().is_empty() => Ok(T::default()),
        Ok(text) => serde_json::from_str(&text)
            .with_context(|| format!("corrupt conversation log {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

impl ConversationStore for JsonConversationStore {
    fn load_history(&self, username: &str) -> Result<()> {
        self.session().previous.clear();
        let mut db = self.read_db()?;
        let turns = db.remove(username).unwrap_or_default();
        info!(username, turns = turns.len(), "conversation history loaded");
        self.session().previous = turns;
        Ok(())
    }

    fn dump_history(&self, username: Option<&str>) -> Result<()> {
        let current = {
            let mut session = self.session();
            session.previous.clear();
            std::mem::take(&mut session.current)
        };
        if current.is_empty() {
            debug!("no new turns to save");
            return Ok(());
        }
        match username {
            Some(user) => {
                let mut db = self.read_db()?;
                db.entry(user.to_string()).or_default().extend(current);
                write_json(&self.db_path, &db)?;
                info!(username = user, "conversation history saved");
            }
            None => {
                let mut log: Vec<Message> = read_json(&self.unknown_path)?;
                log.extend(current);
                write_json(&self.unknown_path, &log)?;
                info!("conversation with unknown user saved");
            }
        }
        Ok(())
    }

    fn record(&self, message: Message) {
        self.session().append_or_new(message);
    }

    fn history(&self) -> Vec<Message> {
        let session = self.session();
        session
            .previous
            .iter()
            .chain(session.current.iter())
            .cloned()
            .collect()
    }

    fn known_users(&self) -> Result<Vec<String>> {
        Ok(self.read_db()?.into_keys().collect())
    }
}
