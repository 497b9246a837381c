use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use super::error::StoreError;

/// Flat key-value namespace holding JSON blobs.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

pub fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

pub async fn get_json<T: DeserializeOwned>(
    kv: &dyn KvStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match kv.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Serde {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub async fn put_json<T: Serialize + ?Sized>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Serde {
        key: key.to_string(),
        source,
    })?;
    kv.put(key, raw).await
}

#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        validate_key(key)?;
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        validate_key(key)?;
        Ok(self.entries.write().await.remove(key).is_some())
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
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Blob {
        name: String,
        count: u32,
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("articles").is_ok());
        assert!(validate_key("cron_logs").is_ok());
        assert!(validate_key("article-views.v2").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../secrets").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("with space").is_err());
    }

    #[tokio::test]
    async fn test_json_roundtrip_through_memory_store() {
        let kv = MemoryKvStore::new();
        let blob = Blob {
            name: "stats".into(),
            count: 3,
        };
        put_json(&kv, "blob", &blob).await.unwrap();
        let loaded: Option<Blob> = get_json(&kv, "blob").await.unwrap();
        assert_eq!(loaded, Some(blob));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let kv = MemoryKvStore::new();
        let loaded: Option<Blob> = get_json(&kv, "nothing").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_blob_reports_key() {
        let kv = MemoryKvStore::new();
        kv.put("blob", "{not json".into()).await.unwrap();
        let err = get_json::<Blob>(&kv, "blob").await.unwrap_err();
        assert!(matches!(err, StoreError::Serde { ref key, .. } if key == "blob"));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let kv = MemoryKvStore::new();
        kv.put("a1", "1".into()).await.unwrap();
        kv.put("a2", "2".into()).await.unwrap();
        kv.put("b1", "3".into()).await.unwrap();

        assert_eq!(kv.list_keys("a").await.unwrap(), vec!["a1", "a2"]);
        assert!(kv.delete("a1").await.unwrap());
        assert!(!kv.delete("a1").await.unwrap());
        assert_eq!(kv.list_keys("").await.unwrap(), vec!["a2", "b1"]);
    }
}
