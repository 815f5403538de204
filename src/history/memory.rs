use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{ SlotStorage, StorageError };

/// Process-local slots. Nothing survives a restart.
#[derive(Default)]
pub struct MemorySlotStorage {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySlotStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStorage for MemorySlotStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.slots.lock().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.slots.lock().await.remove(key);
        Ok(())
    }
}
