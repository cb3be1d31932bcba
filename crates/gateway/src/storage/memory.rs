//! # メモリ内 Blob Storage
//!
//! プロセス内の `HashMap` に保存する実装。再起動で消える。開発・テスト用。

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{is_valid_resource_id, BlobStore, StoredBlob};
use crate::error::GatewayError;

/// メモリ内 Blob Storage。
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn put_new(&self, resource_id: &str, blob: StoredBlob) -> Result<bool, GatewayError> {
        if !is_valid_resource_id(resource_id) {
            return Err(GatewayError::Storage(format!(
                "不正なリソースID: {resource_id}"
            )));
        }
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(resource_id) {
            return Ok(false);
        }
        blobs.insert(resource_id.to_string(), blob);
        Ok(true)
    }

    async fn get(&self, resource_id: &str) -> Result<Option<StoredBlob>, GatewayError> {
        Ok(self.blobs.read().await.get(resource_id).cloned())
    }
}
