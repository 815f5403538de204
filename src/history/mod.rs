mod file;
mod memory;

pub use file::FileSlotStorage;
pub use memory::MemorySlotStorage;

use async_trait::async_trait;
use log::{ error, info, warn };
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::models::chat::{ Conversation, Role, Turn };

pub const DEFAULT_HISTORY_KEY: &str = "ai-chat-history";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")] Io(#[from] std::io::Error),
    #[error("history JSON error: {0}")] Json(#[from] serde_json::Error),
}

/// A durable key-value slot holding one serialized snapshot per key.
#[async_trait]
pub trait SlotStorage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a key that does not exist is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Owns the conversation. The in-memory copy is authoritative for the
/// running session; the durable slot mirrors it after every mutation.
pub struct ConversationStore {
    storage: Arc<dyn SlotStorage>,
    key: String,
    conversation: Conversation,
    /// Entries of the loaded snapshot that did not decode as turns, with
    /// their original array index. Written back untouched on every persist.
    unrecognized: Vec<(usize, Value)>,
}

impl ConversationStore {
    pub fn new(storage: Arc<dyn SlotStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            conversation: Conversation::new(),
            unrecognized: Vec::new(),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Hydrates from the durable slot. Missing or unreadable history
    /// degrades to an empty conversation.
    pub async fn load(&mut self) -> &Conversation {
        let (conversation, unrecognized) = match self.storage.get(&self.key).await {
            Ok(Some(raw)) => parse_snapshot(&raw),
            Ok(None) => (Conversation::new(), Vec::new()),
            Err(e) => {
                error!("Failed to load chat history: {}", e);
                (Conversation::new(), Vec::new())
            }
        };
        self.conversation = conversation;
        self.unrecognized = unrecognized;
        info!("Loaded {} turns from history slot '{}'", self.conversation.len(), self.key);
        &self.conversation
    }

    /// Appends a turn stamped with the current instant and persists the
    /// whole snapshot. A failed write is logged; the turn stays in memory.
    pub async fn append(&mut self, role: Role, content: impl Into<String>) -> &Conversation {
        self.append_turn(Turn::new(role, content)).await
    }

    /// Appends an already stamped turn and persists the snapshot.
    pub async fn append_turn(&mut self, turn: Turn) -> &Conversation {
        self.conversation.turns.push(turn);
        self.persist().await;
        &self.conversation
    }

    /// Drops every turn and deletes the durable slot itself.
    pub async fn clear(&mut self) {
        self.conversation = Conversation::new();
        self.unrecognized.clear();
        if let Err(e) = self.storage.remove(&self.key).await {
            error!("Failed to remove chat history: {}", e);
        }
    }

    async fn persist(&self) {
        let result = match self.snapshot() {
            Ok(json) => self.storage.set(&self.key, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            error!("Failed to save chat history: {}", e);
        }
    }

    fn snapshot(&self) -> Result<String, serde_json::Error> {
        if self.unrecognized.is_empty() {
            return serde_json::to_string(&self.conversation);
        }
        let mut entries = self.conversation.turns
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        // Ascending indices, so each insert lands where the entry was read.
        for (index, raw) in &self.unrecognized {
            let at = (*index).min(entries.len());
            entries.insert(at, raw.clone());
        }
        serde_json::to_string(&entries)
    }
}

fn parse_snapshot(raw: &str) -> (Conversation, Vec<(usize, Value)>) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to load chat history: {}", e);
            return (Conversation::new(), Vec::new());
        }
    };

    let entries = match value {
        Value::Array(entries) => entries,
        other => {
            warn!("Ignoring chat history: expected an array, found {}", json_kind(&other));
            return (Conversation::new(), Vec::new());
        }
    };

    let mut turns = Vec::with_capacity(entries.len());
    let mut unrecognized = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<Turn>(entry.clone()) {
            Ok(turn) => turns.push(turn),
            Err(e) => {
                warn!("Keeping undecodable history entry {} as is: {}", index, e);
                unrecognized.push((index, entry));
            }
        }
    }
    (Conversation::from(turns), unrecognized)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn format_history_for_display(conversation: &Conversation) -> String {
    let mut result = String::new();
    for turn in &conversation.turns {
        let role_display = match turn.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        let local = turn.timestamp.with_timezone(&chrono::Local);
        result.push_str(&format!("[{}] {}: {}\n", local.format("%H:%M"), role_display, turn.content));
    }
    result
}
