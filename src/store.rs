//! Block persistence.
//!
//! Encoded blocks are persisted as independently addressable files under a
//! key embedding both the source-file hash and the block's own content
//! hash. The store is append-only and content-addressed: writing the same
//! key twice is always writing identical bytes, so concurrent writers
//! never conflict and duplicates deduplicate by construction. No locking
//! is required at this layer.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use snafu::ResultExt;
use tracing::debug;
use tracing::info;
use tracing::instrument;

use crate::error::IoSnafu;
use crate::error::StoreError;
use crate::record::block_key;
use crate::record::block_key_prefix;
use crate::record::EncodedBlock;

/// Outcome of persisting one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutBlockResult {
    /// Key the block lives under.
    pub key: String,
    /// Whether the block was newly written (false: deduplicated).
    pub was_new: bool,
}

/// Content-addressed persistence for encoded blocks.
///
/// Implementations must tolerate repeated puts of the same block and must
/// isolate per-block failures: one failed write or read never poisons the
/// rest of the set.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Persist one block under its derived key.
    async fn put_block(
        &self,
        source: &blake3::Hash,
        index: u64,
        block: &EncodedBlock,
    ) -> Result<PutBlockResult, StoreError>;

    /// Fetch the raw record bytes under `key`.
    async fn get_block(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Whether a block exists under `key`.
    async fn contains(&self, key: &str) -> Result<bool, StoreError>;

    /// All keys belonging to one source file, in stable order.
    async fn list_blocks(&self, source: &blake3::Hash) -> Result<Vec<String>, StoreError>;
}

/// Filesystem-backed block store: one file per block in a flat directory.
#[derive(Debug, Clone)]
pub struct FsBlockStore {
    root: PathBuf,
}

impl FsBlockStore {
    /// Open (creating if needed) a block store rooted at `root`.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await.context(IoSnafu {
            path: root.display().to_string(),
        })?;
        info!("block store opened at {}", root.display());
        Ok(Self { root })
    }

    /// Directory holding the block files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlockStore for FsBlockStore {
    async fn put_block(
        &self,
        source: &blake3::Hash,
        index: u64,
        block: &EncodedBlock,
    ) -> Result<PutBlockResult, StoreError> {
        let key = block_key(source, index, &block.content_hash);
        let path = self.path_for(&key);
        let exists = tokio::fs::try_exists(&path).await.context(IoSnafu {
            path: path.display().to_string(),
        })?;
        if exists {
            // Same key means same content hash means identical bytes.
            debug!(%key, "block already present, skipping write");
            return Ok(PutBlockResult { key, was_new: false });
        }
        tokio::fs::write(&path, block.to_bytes()).await.context(IoSnafu {
            path: path.display().to_string(),
        })?;
        Ok(PutBlockResult { key, was_new: true })
    }

    async fn get_block(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                key: key.to_string(),
            }),
            Err(e) => Err(StoreError::Io {
                path: path.display().to_string(),
                source: e,
            }),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.path_for(key);
        tokio::fs::try_exists(&path).await.context(IoSnafu {
            path: path.display().to_string(),
        })
    }

    async fn list_blocks(&self, source: &blake3::Hash) -> Result<Vec<String>, StoreError> {
        let prefix = block_key_prefix(source);
        let mut entries = tokio::fs::read_dir(&self.root).await.context(IoSnafu {
            path: self.root.display().to_string(),
        })?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await.context(IoSnafu {
            path: self.root.display().to_string(),
        })? {
            let name = entry.file_name();
            if let Some(name) = name.to_str() {
                if name.starts_with(&prefix) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory block store for tests and ephemeral pipelines.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockStore {
    blocks: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryBlockStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks held.
    pub fn len(&self) -> usize {
        self.blocks.read().unwrap().len()
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put_block(
        &self,
        source: &blake3::Hash,
        index: u64,
        block: &EncodedBlock,
    ) -> Result<PutBlockResult, StoreError> {
        let key = block_key(source, index, &block.content_hash);
        let bytes = Bytes::from(block.to_bytes());
        let was_new = {
            let mut blocks = self.blocks.write().unwrap();
            blocks.insert(key.clone(), bytes).is_none()
        };
        Ok(PutBlockResult { key, was_new })
    }

    async fn get_block(&self, key: &str) -> Result<Bytes, StoreError> {
        let blocks = self.blocks.read().unwrap();
        blocks.get(key).cloned().ok_or_else(|| StoreError::NotFound {
            key: key.to_string(),
        })
    }

    async fn contains(&self, key: &str) -> Result<bool, StoreError> {
        let blocks = self.blocks.read().unwrap();
        Ok(blocks.contains_key(key))
    }

    async fn list_blocks(&self, source: &blake3::Hash) -> Result<Vec<String>, StoreError> {
        let prefix = block_key_prefix(source);
        let blocks = self.blocks.read().unwrap();
        let mut keys: Vec<String> = blocks.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::source_hash;

    fn block() -> EncodedBlock {
        EncodedBlock::new(100, 50, 9, vec![0x11; 50])
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryBlockStore::new();
        let source = source_hash(b"file");
        let block = block();

        let put = store.put_block(&source, 0, &block).await.expect("put");
        assert!(put.was_new);
        assert!(store.contains(&put.key).await.expect("contains"));

        let bytes = store.get_block(&put.key).await.expect("get");
        let back = EncodedBlock::from_bytes(&bytes).expect("parse");
        assert_eq!(back, block);
    }

    #[tokio::test]
    async fn memory_store_deduplicates() {
        let store = MemoryBlockStore::new();
        let source = source_hash(b"file");
        let block = block();

        assert!(store.put_block(&source, 0, &block).await.expect("put").was_new);
        assert!(!store.put_block(&source, 0, &block).await.expect("put").was_new);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn listing_is_scoped_to_one_source() {
        let store = MemoryBlockStore::new();
        let block = block();
        store.put_block(&source_hash(b"a"), 0, &block).await.expect("put");
        store.put_block(&source_hash(b"b"), 0, &block).await.expect("put");

        let keys = store.list_blocks(&source_hash(b"a")).await.expect("list");
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with(&block_key_prefix(&source_hash(b"a"))));
    }

    #[tokio::test]
    async fn missing_block_is_not_found() {
        let store = MemoryBlockStore::new();
        let err = store.get_block("FileHash__x__Block__0__BlockHash_y").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
