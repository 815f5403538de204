use async_trait::async_trait;
use log::debug;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ SlotStorage, StorageError };

/// One `<key>.json` file per slot inside `dir`.
pub struct FileSlotStorage {
    dir: PathBuf,
}

impl FileSlotStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

// Keys name files, so anything outside [A-Za-z0-9_-.] becomes '_'.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

#[async_trait]
impl SlotStorage for FileSlotStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.slot_path(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes to a sibling temp file, fsyncs it and renames it over the
    /// slot, so readers only ever see a complete snapshot.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.slot_path(key);
        let tmp = path.with_extension("json.tmp");

        let mut tmp_file = fs::File::create(&tmp).await?;
        tmp_file.write_all(value.as_bytes()).await?;
        tmp_file.sync_all().await?;
        drop(tmp_file);

        fs::rename(&tmp, &path).await?;
        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.slot_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ ConversationStore, DEFAULT_HISTORY_KEY };
    use crate::models::chat::Role;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn set_get_remove_cycle() {
        let dir = TempDir::new().unwrap();
        let storage = FileSlotStorage::new(dir.path().join("nested"));

        assert_eq!(storage.get("slot").await.unwrap(), None);
        storage.set("slot", "[1,2]").await.unwrap();
        assert_eq!(storage.get("slot").await.unwrap().as_deref(), Some("[1,2]"));
        assert!(!storage.slot_path("slot").with_extension("json.tmp").exists());

        storage.remove("slot").await.unwrap();
        assert!(!storage.slot_path("slot").exists());
        storage.remove("slot").await.unwrap();
    }

    #[tokio::test]
    async fn overwrite_replaces_the_whole_snapshot() {
        let dir = TempDir::new().unwrap();
        let storage = FileSlotStorage::new(dir.path());

        storage.set("slot", "[1,2,3,4,5,6]").await.unwrap();
        storage.set("slot", "[]").await.unwrap();
        assert_eq!(storage.get("slot").await.unwrap().as_deref(), Some("[]"));

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("slot.json")]);
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        let storage = FileSlotStorage::new("/tmp/history");
        assert_eq!(storage.slot_path("../etc/passwd"), PathBuf::from("/tmp/history/.._etc_passwd.json"));
    }

    #[tokio::test]
    async fn conversation_survives_restart_and_clear_deletes_file() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(FileSlotStorage::new(dir.path()));

        let mut store = ConversationStore::new(storage.clone(), DEFAULT_HISTORY_KEY);
        store.load().await;
        store.append(Role::User, "Hello").await;
        store.append(Role::Assistant, "Hi").await;

        let mut restarted = ConversationStore::new(storage.clone(), DEFAULT_HISTORY_KEY);
        let conversation = restarted.load().await.clone();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns[0].content, "Hello");
        assert_eq!(&conversation, store.conversation());

        restarted.clear().await;
        assert!(!storage.slot_path(DEFAULT_HISTORY_KEY).exists());
    }
}
