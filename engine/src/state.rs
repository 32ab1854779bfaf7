//! Persistence glue (spec'd as "a namespaced key-value store with async
//! get/put", never a concrete database): the [`KvStore`] trait the façade
//! is built against, and the scan cursor snapshot format that sits
//! alongside the tree's and cache's own versioned blobs.

use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::{EngineError, StateError};

const SNAPSHOT_VERSION: u32 = 1;

/// Namespaced async key-value storage. The façade never assumes anything
/// about the backend beyond this contract; it owns no database connection
/// itself.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), EngineError>;
}

pub fn tree_key(wallet_id: &str) -> String {
    format!("tree/{wallet_id}")
}

pub fn cache_key(wallet_id: &str) -> String {
    format!("cache/{wallet_id}")
}

pub fn scan_cursor_key(wallet_id: &str) -> String {
    format!("scan_cursor/{wallet_id}")
}

/// The last block height a scan successfully committed for one wallet.
/// Persisted independently of the tree/cache blobs so a resumed scan
/// knows where to start without having to infer it from tree size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCursor {
    pub height: u64,
}

impl ScanCursor {
    pub fn export(&self) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(SNAPSHOT_VERSION)?;
        out.write_u64::<LittleEndian>(self.height)?;
        Ok(out)
    }

    pub fn import(bytes: &[u8]) -> Result<Self, EngineError> {
        let mut reader = bytes;
        let version = reader.read_u32::<LittleEndian>()?;
        if version != SNAPSHOT_VERSION {
            return Err(StateError::VersionMismatch {
                key: "scan_cursor".to_string(),
                found: version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }
        let height = reader.read_u64::<LittleEndian>()?;
        Ok(ScanCursor { height })
    }
}

/// In-memory [`KvStore`] used in tests and by callers with no durable
/// backend yet wired up.
#[derive(Default)]
pub struct MemoryStore {
    inner: tokio::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), EngineError> {
        self.inner.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_cursor_round_trips() {
        let cursor = ScanCursor { height: 123_456 };
        let bytes = cursor.export().unwrap();
        assert_eq!(ScanCursor::import(&bytes).unwrap(), cursor);
    }

    #[test]
    fn scan_cursor_rejects_wrong_version() {
        let mut bytes = ScanCursor { height: 1 }.export().unwrap();
        bytes[0] = 99;
        assert!(ScanCursor::import(&bytes).is_err());
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        store.put("k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(vec![1, 2, 3]));
    }
}
