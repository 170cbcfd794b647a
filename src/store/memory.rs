//! In-memory metadata store

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;

use super::{MetadataStore, StoreError, StreamRecord};

/// Length of generated stream keys
pub const KEY_LENGTH: usize = 20;

/// Random lowercase alphanumeric stream key
pub fn generate_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_lowercase())
        .take(KEY_LENGTH)
        .collect()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    streams: RwLock<HashMap<String, StreamRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = StreamRecord>) -> Result<Self, StoreError> {
        let store = Self::new();
        for record in records {
            store.insert(record)?;
        }
        Ok(store)
    }

    pub fn insert(&self, record: StreamRecord) -> Result<(), StoreError> {
        let mut streams = self.streams.write();
        if streams.contains_key(&record.stream_name) {
            return Err(StoreError::AlreadyExists(record.stream_name));
        }
        streams.insert(record.stream_name.clone(), record);
        Ok(())
    }

    /// Add a stream with a freshly generated key
    pub fn create_stream(&self, stream_name: &str) -> Result<StreamRecord, StoreError> {
        let record = StreamRecord::new(stream_name, generate_key());
        self.insert(record.clone())?;
        Ok(record)
    }

    pub fn remove(&self, stream_name: &str) -> Option<StreamRecord> {
        self.streams.write().remove(stream_name)
    }

    pub fn len(&self) -> usize {
        self.streams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.read().is_empty()
    }

    pub fn get(&self, stream_name: &str) -> Option<StreamRecord> {
        self.streams.read().get(stream_name).cloned()
    }
}

impl MetadataStore for MemoryStore {
    async fn find_stream_by_name(&self, name: &str) -> Result<Option<StreamRecord>, StoreError> {
        Ok(self.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys() {
        let key = generate_key();
        assert_eq!(key.len(), KEY_LENGTH);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        assert_ne!(generate_key(), key);
    }

    #[test]
    fn test_duplicate_insert() {
        let store = MemoryStore::new();
        store.insert(StreamRecord::new("alpha", "secret1")).unwrap();

        assert_eq!(
            store.insert(StreamRecord::new("alpha", "other")),
            Err(StoreError::AlreadyExists("alpha".into()))
        );
        assert_eq!(store.get("alpha").unwrap().key, "secret1");
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let store = MemoryStore::with_records([StreamRecord::new("alpha", "secret1")]).unwrap();
        let created = store.create_stream("beta").unwrap();

        let alpha = store.find_stream_by_name("alpha").await.unwrap().unwrap();
        assert_eq!(alpha.key, "secret1");

        let beta = store.find_stream_by_name("beta").await.unwrap().unwrap();
        assert_eq!(beta.key, created.key);

        assert!(store.find_stream_by_name("gamma").await.unwrap().is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_record_json_hides_key() {
        let record = StreamRecord::new("alpha", "secret1");
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.contains("\"streamName\":\"alpha\""));
        assert!(!json.contains("secret1"));
    }
}
