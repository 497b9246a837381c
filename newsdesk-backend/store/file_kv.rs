use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::error::StoreError;
use super::kv::{KvStore, validate_key};

/// One `<key>.json` file per entry under `<base_dir>/kv`, mirrored in memory.
pub struct FileKvStore {
    base_dir: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileKvStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn kv_dir(&self) -> PathBuf {
        self.base_dir.join("kv")
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.kv_dir().join(format!("{key}.json"))
    }

    pub async fn load_all(&self) -> Result<(), StoreError> {
        let dir = self.kv_dir();
        std::fs::create_dir_all(&dir)?;

        let mut loaded = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            if validate_key(&key).is_err() {
                tracing::warn!(path = %path.display(), "Skipping file with invalid key name");
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    loaded.insert(key, content);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable kv file");
                }
            }
        }

        if !loaded.is_empty() {
            tracing::info!(count = loaded.len(), dir = %dir.display(), "Loaded kv entries");
        }
        *self.entries.write().await = loaded;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        validate_key(key)?;
        let dir = self.kv_dir();
        std::fs::create_dir_all(&dir)?;

        // write-then-rename so a crash never leaves a half-written blob
        let path = self.entry_path(key);
        let tmp = dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, &value)?;
        std::fs::rename(&tmp, &path)?;

        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        let existed = self.entries.write().await.remove(key).is_some();
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(existed)
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_and_reload() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path());
        store.load_all().await.unwrap();
        store.put("stats", r#"{"totalViews":4}"#.into()).await.unwrap();

        // New store on same dir
        let store2 = FileKvStore::new(dir.path());
        store2.load_all().await.unwrap();
        assert_eq!(
            store2.get("stats").await.unwrap().as_deref(),
            Some(r#"{"totalViews":4}"#)
        );
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path());
        store.load_all().await.unwrap();
        store.put("articles", "[]".into()).await.unwrap();
        assert!(dir.path().join("kv").join("articles.json").exists());

        assert!(store.delete("articles").await.unwrap());
        assert!(!dir.path().join("kv").join("articles.json").exists());
        assert!(store.get("articles").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_skips_non_json_and_temp_files() {
        let dir = tempdir().unwrap();
        let kv_dir = dir.path().join("kv");
        std::fs::create_dir_all(&kv_dir).unwrap();
        std::fs::write(kv_dir.join("config.json"), "{}").unwrap();
        std::fs::write(kv_dir.join("notes.txt"), "ignored").unwrap();
        std::fs::write(kv_dir.join(".config.json.tmp"), "{}").unwrap();

        let store = FileKvStore::new(dir.path());
        store.load_all().await.unwrap();
        assert_eq!(store.list_keys("").await.unwrap(), vec!["config"]);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path());
        store.load_all().await.unwrap();
        let err = store.put("../escape", "x".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }
}
