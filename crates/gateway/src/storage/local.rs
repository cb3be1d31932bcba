//! # ローカルディレクトリ Blob Storage
//!
//! `{dir}/{resource_id}.bin` に本体、`{dir}/{resource_id}.json` にメタデータを保存する。
//! メタデータは一時ファイルからのリネームで書き込むため、読み出し側が
//! 書きかけのメタデータを観測することはない。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use axum::body::Bytes;
use tokio::io::AsyncWriteExt;

use super::{is_valid_resource_id, BlobMetadata, BlobStore, StoredBlob};
use crate::error::GatewayError;

/// ローカルディレクトリ Blob Storage。
pub struct LocalBlobStore {
    dir: PathBuf,
}

impl LocalBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn data_path(&self, resource_id: &str) -> PathBuf {
        self.dir.join(format!("{resource_id}.bin"))
    }

    fn metadata_path(&self, resource_id: &str) -> PathBuf {
        self.dir.join(format!("{resource_id}.json"))
    }

    /// メタデータを一時ファイル経由で書き込む。失敗時は一時ファイルを残さない。
    async fn write_metadata(
        &self,
        resource_id: &str,
        blob: &StoredBlob,
    ) -> Result<(), GatewayError> {
        let metadata = serde_json::to_vec(&BlobMetadata::of(blob))
            .map_err(|e| GatewayError::Internal(format!("メタデータのシリアライズに失敗: {e}")))?;
        let metadata_path = self.metadata_path(resource_id);
        let tmp_path = self.dir.join(format!(".{resource_id}.json.tmp"));

        if let Err(e) = tokio::fs::write(&tmp_path, metadata).await {
            discard_partial(&tmp_path).await;
            return Err(storage_err("メタデータの書き込みに失敗", &tmp_path, e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &metadata_path).await {
            discard_partial(&tmp_path).await;
            return Err(storage_err("メタデータの書き込みに失敗", &metadata_path, e));
        }
        Ok(())
    }
}

/// 書きかけのファイルを削除する。存在しなければ何もしない。
pub(crate) async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "書きかけのファイルの削除に失敗");
        }
    }
}

fn storage_err(context: &str, path: &Path, e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Storage(format!("{context} ({}): {e}", path.display()))
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn put_new(&self, resource_id: &str, blob: StoredBlob) -> Result<bool, GatewayError> {
        if !is_valid_resource_id(resource_id) {
            return Err(GatewayError::Storage(format!(
                "不正なリソースID: {resource_id}"
            )));
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_err("ディレクトリの作成に失敗", &self.dir, e))?;

        let data_path = self.data_path(resource_id);
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&data_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(storage_err("ファイルの作成に失敗", &data_path, e)),
        };
        let written = async {
            file.write_all(&blob.bytes).await?;
            file.sync_all().await
        }
        .await;
        drop(file);
        if let Err(e) = written {
            discard_partial(&data_path).await;
            return Err(storage_err("書き込みに失敗", &data_path, e));
        }

        if let Err(e) = self.write_metadata(resource_id, &blob).await {
            discard_partial(&data_path).await;
            return Err(e);
        }

        Ok(true)
    }

    async fn get(&self, resource_id: &str) -> Result<Option<StoredBlob>, GatewayError> {
        if !is_valid_resource_id(resource_id) {
            return Ok(None);
        }

        let metadata_path = self.metadata_path(resource_id);
        let metadata = match tokio::fs::read(&metadata_path).await {
            Ok(raw) => serde_json::from_slice::<BlobMetadata>(&raw)
                .map_err(|e| storage_err("メタデータのパースに失敗", &metadata_path, e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err("メタデータの読み込みに失敗", &metadata_path, e)),
        };

        let data_path = self.data_path(resource_id);
        let bytes = match tokio::fs::read(&data_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err("ファイルの読み込みに失敗", &data_path, e)),
        };

        Ok(Some(metadata.into_blob(Bytes::from(bytes))))
    }
}
