use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::schemas::{MessageContent, MessageType};
use crate::core::utils::{new_id, utcnow_rfc3339};

/// Who authored a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Ai,
    System,
    Tool,
}

/// A single line in a tape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredMessage {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub sent_at: String,
}

impl StoredMessage {
    /// New message stamped with a fresh id, the current time and type `text`
    /// (or `file` for file content).
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        let content = content.into();
        let kind = match content {
            MessageContent::File(_) => MessageType::File,
            MessageContent::Text(_) => MessageType::Text,
        };
        Self {
            id: new_id(),
            role,
            content,
            kind,
            sent_at: utcnow_rfc3339(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

/// Append-only JSONL message log.
///
/// - One JSON object per line, in append order.
/// - Lines that fail to parse are skipped on open.
/// - The in-memory copy mirrors the file as of `open` plus this handle's
///   own appends.
pub struct TapeStore {
    path: PathBuf,
    entries: Vec<StoredMessage>,
}

impl TapeStore {
    /// Create or open a tape at the given directory.
    pub fn open(dir: &Path, name: &str) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.jsonl"));
        let entries = Self::read_file(&path)?;
        Ok(Self {
            path,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message, persisting it before it becomes visible.
    pub fn append(&mut self, message: StoredMessage) -> std::io::Result<&StoredMessage> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(&message)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(file, "{line}")?;

        self.entries.push(message);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// All messages in append order.
    pub fn entries(&self) -> &[StoredMessage] {
        &self.entries
    }

    /// The last `n` messages.
    pub fn tail(&self, n: usize) -> &[StoredMessage] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove the tape file and forget all entries.
    pub fn clear(&mut self) -> std::io::Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.entries.clear();
        Ok(())
    }

    fn read_file(path: &Path) -> std::io::Result<Vec<StoredMessage>> {
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredMessage>(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(path = %path.display(), line = lineno + 1, error = %e, "tape.corrupt_line");
                }
            }
        }

        Ok(entries)
    }
}
