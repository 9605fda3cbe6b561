//! Per-conversation message memory.
//!
//! Every session (`"{user}:{conversation}"`) owns two tapes:
//! - the **fixed** tape holds opening remarks that always stay in the
//!   model's memory window;
//! - the **main** tape holds the running conversation.

use std::path::PathBuf;

use tracing::debug;

use crate::core::error::Result;
use crate::core::schemas::MessageContent;
use crate::core::utils::{path_key, user_key};
use crate::tape::store::{Role, StoredMessage, TapeStore};

/// Session key for a user / conversation pair.
///
/// The user part never contains `:`, so distinct pairs give distinct keys.
pub fn session_key(user: Option<&str>, conversation: &str) -> String {
    format!("{}:{conversation}", user_key(user))
}

/// Root of all history tapes.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    root: PathBuf,
}

impl HistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open both tapes of a session.
    pub fn session(&self, user: Option<&str>, conversation: &str) -> Result<SessionHistory> {
        let key = session_key(user, conversation);
        let file_name = path_key(&key);
        let fixed = TapeStore::open(&self.root.join("fixed"), &file_name)?;
        let main = TapeStore::open(&self.root.join("messages"), &file_name)?;
        Ok(SessionHistory { key, fixed, main })
    }
}

pub struct SessionHistory {
    key: String,
    fixed: TapeStore,
    main: TapeStore,
}

impl SessionHistory {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append to the running conversation.
    pub fn add_message(&mut self, message: StoredMessage) -> Result<()> {
        debug!(session = %self.key, role = ?message.role, "history.append");
        self.main.append(message)?;
        Ok(())
    }

    /// Append to the fixed opening-remarks tape.
    pub fn add_fixed_message(&mut self, message: StoredMessage) -> Result<()> {
        debug!(session = %self.key, role = ?message.role, "history.append_fixed");
        self.fixed.append(message)?;
        Ok(())
    }

    pub fn add(&mut self, role: Role, content: impl Into<MessageContent>) -> Result<()> {
        self.add_message(StoredMessage::new(role, content))
    }

    /// All messages of the running conversation.
    pub fn messages(&self) -> &[StoredMessage] {
        self.main.entries()
    }

    pub fn fixed_messages(&self) -> &[StoredMessage] {
        self.fixed.entries()
    }

    /// Fixed messages followed by the last `window_size` exchange pairs.
    pub fn windowed_messages(&self, window_size: usize) -> Vec<StoredMessage> {
        let mut out = self.fixed.entries().to_vec();
        out.extend_from_slice(self.main.tail(window_size * 2));
        out
    }

    pub fn clear(&mut self) -> Result<()> {
        self.fixed.clear()?;
        self.main.clear()?;
        Ok(())
    }
}
