//! # Blob Storage
//!
//! アップロードされたバイト列を保存・取得する抽象インターフェース。
//! 実装は環境変数 `STORAGE_BACKEND` で選択する。
//!
//! ## ストレージ実装
//! - `memory`: プロセス内メモリ（開発・テスト用）
//! - `local`: ローカルディレクトリ
//! - `s3`: S3互換ストレージ（AWS S3, MinIO, Cloudflare R2等）

pub mod local;
pub mod memory;
#[cfg(feature = "vendor-aws")]
pub mod s3;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;
#[cfg(feature = "vendor-aws")]
pub use s3::S3BlobStore;

use axum::body::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// リソースIDの最大長
const MAX_RESOURCE_ID_LEN: usize = 64;

/// 保存されたオブジェクト。作成後は不変。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// 本体
    pub bytes: Bytes,
    /// 元のファイル名（Content-Dispositionに使用）
    pub display_name: String,
    /// MIMEタイプ
    pub content_type: String,
}

/// オブジェクト本体と並べて保存するメタデータ。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BlobMetadata {
    pub display_name: String,
    pub content_type: String,
    pub size: u64,
}

impl BlobMetadata {
    pub(crate) fn of(blob: &StoredBlob) -> Self {
        Self {
            display_name: blob.display_name.clone(),
            content_type: blob.content_type.clone(),
            size: blob.bytes.len() as u64,
        }
    }

    pub(crate) fn into_blob(self, bytes: Bytes) -> StoredBlob {
        StoredBlob {
            bytes,
            display_name: self.display_name,
            content_type: self.content_type,
        }
    }
}

/// Blob Storageの抽象インターフェース。
///
/// Gatewayはこのトレイト経由でのみ保存先にアクセスする。
/// リソースIDはGatewayが生成するため、実装側は内容やファイル名からキーを導出しない。
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// バックエンド名（ログ出力用）。
    fn backend(&self) -> &'static str;

    /// 新しいIDでオブジェクトを保存する。
    ///
    /// 同じIDが既に存在する場合は何も書き込まずに `false` を返す。
    async fn put_new(&self, resource_id: &str, blob: StoredBlob) -> Result<bool, GatewayError>;

    /// オブジェクトを取得する。存在しなければ `None`。
    async fn get(&self, resource_id: &str) -> Result<Option<StoredBlob>, GatewayError>;
}

/// リソースIDとして受け入れる形式か判定する。
///
/// パスやオブジェクトキーに埋め込むため、英数字とハイフンのみを許可する。
pub fn is_valid_resource_id(resource_id: &str) -> bool {
    !resource_id.is_empty()
        && resource_id.len() <= MAX_RESOURCE_ID_LEN
        && resource_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}
