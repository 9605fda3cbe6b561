use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::core::error::{Result, SandchatError};
use crate::core::schemas::Conversation;
use crate::core::utils::new_id;

pub const DEFAULT_TITLE: &str = "New chat";

/// Conversation metadata, persisted as one JSON snapshot file.
///
/// Every mutation rewrites the snapshot (write to a temp file, then rename)
/// while holding the write lock.
pub struct ConversationStore {
    path: PathBuf,
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl ConversationStore {
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join("conversations.json");
        let conversations = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                let list: Vec<Conversation> = serde_json::from_str(&raw)?;
                list.into_iter().map(|c| (c.id.clone(), c)).collect()
            }
        } else {
            HashMap::new()
        };
        debug!(path = %path.display(), count = conversations.len(), "conversations.loaded");
        Ok(Self {
            path,
            conversations: RwLock::new(conversations),
        })
    }

    pub async fn create(&self, owner: Option<&str>, title: Option<&str>) -> Result<Conversation> {
        let now = Utc::now();
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);
        let conversation = Conversation {
            id: new_id(),
            title: title.to_string(),
            owner: owner.map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        let mut guard = self.conversations.write().await;
        guard.insert(conversation.id.clone(), conversation.clone());
        self.persist(&guard)?;
        info!(id = %conversation.id, owner = ?owner, "conversation.created");
        Ok(conversation)
    }

    /// Fetch a conversation visible to `owner`.
    pub async fn get(&self, id: &str, owner: Option<&str>) -> Result<Conversation> {
        let guard = self.conversations.read().await;
        guard
            .get(id)
            .filter(|c| c.owner.as_deref() == owner)
            .cloned()
            .ok_or_else(|| SandchatError::NotFound(format!("conversation {id}")))
    }

    /// Conversations of `owner`, most recently updated first.
    pub async fn list(&self, owner: Option<&str>) -> Vec<Conversation> {
        let guard = self.conversations.read().await;
        let mut out: Vec<Conversation> = guard
            .values()
            .filter(|c| c.owner.as_deref() == owner)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    pub async fn update_title(
        &self,
        id: &str,
        owner: Option<&str>,
        title: &str,
    ) -> Result<Conversation> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SandchatError::BadRequest("title must not be empty".to_string()));
        }
        self.modify(id, owner, |c| {
            c.title = title.to_string();
            c.updated_at = Utc::now();
        })
        .await
    }

    /// Bump `updated_at` after activity in the conversation.
    pub async fn touch(&self, id: &str, owner: Option<&str>) -> Result<Conversation> {
        self.modify(id, owner, |c| c.updated_at = Utc::now()).await
    }

    pub async fn delete(&self, id: &str, owner: Option<&str>) -> Result<Conversation> {
        let mut guard = self.conversations.write().await;
        let visible = guard
            .get(id)
            .is_some_and(|c| c.owner.as_deref() == owner);
        if !visible {
            return Err(SandchatError::NotFound(format!("conversation {id}")));
        }
        let removed = guard
            .remove(id)
            .ok_or_else(|| SandchatError::NotFound(format!("conversation {id}")))?;
        self.persist(&guard)?;
        info!(id = %id, "conversation.deleted");
        Ok(removed)
    }

    async fn modify<F>(&self, id: &str, owner: Option<&str>, f: F) -> Result<Conversation>
    where
        F: FnOnce(&mut Conversation),
    {
        let mut guard = self.conversations.write().await;
        let conversation = guard
            .get_mut(id)
            .filter(|c| c.owner.as_deref() == owner)
            .ok_or_else(|| SandchatError::NotFound(format!("conversation {id}")))?;
        f(conversation);
        let updated = conversation.clone();
        self.persist(&guard)?;
        Ok(updated)
    }

    fn persist(&self, conversations: &HashMap<String, Conversation>) -> Result<()> {
        let mut list: Vec<&Conversation> = conversations.values().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let raw = serde_json::to_string_pretty(&list)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
