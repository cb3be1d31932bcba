//! # S3互換 Blob Storage 実装
//!
//! AWS S3, MinIO, Cloudflare R2 等のS3互換APIを使用する実装。
//! `objects/{resource_id}` に本体、`objects/{resource_id}.json` にメタデータを保存する。

use axum::body::Bytes;
use s3::error::S3Error;

use super::{is_valid_resource_id, BlobMetadata, BlobStore, StoredBlob};
use crate::error::GatewayError;

/// オブジェクトキーのプレフィックス
const OBJECT_PREFIX: &str = "objects";
/// `S3_BUCKET` 未設定時のバケット名
const DEFAULT_BUCKET: &str = "parcel-objects";
/// AWS以外のエンドポイントで使うリージョン
const FALLBACK_REGION: &str = "us-east-1";

/// `s3.<region>.amazonaws.com` 形式のエンドポイントからリージョンを取り出す。
/// それ以外（MinIO, R2等）は `us-east-1`。
fn region_from_endpoint(endpoint: &str) -> String {
    endpoint
        .split_once("s3.")
        .and_then(|(_, rest)| rest.split_once(".amazonaws.com"))
        .map(|(region, _)| region)
        .filter(|region| !region.is_empty() && !region.contains('/'))
        .unwrap_or(FALLBACK_REGION)
        .to_string()
}

/// S3互換ストレージによる Blob Storage 実装。
pub struct S3BlobStore {
    bucket: s3::Bucket,
}

impl S3BlobStore {
    pub fn new(bucket: s3::Bucket) -> Self {
        Self { bucket }
    }

    /// 接続情報からパススタイルのバケットハンドルを作る。通信は行わない。
    fn open_bucket(
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket_name: &str,
    ) -> anyhow::Result<s3::Bucket> {
        let region = s3::Region::Custom {
            region: std::env::var("S3_REGION")
                .unwrap_or_else(|_| region_from_endpoint(endpoint)),
            endpoint: endpoint.to_string(),
        };
        let credentials =
            s3::creds::Credentials::new(Some(access_key), Some(secret_key), None, None, None)?;
        let bucket = s3::Bucket::new(bucket_name, region, credentials)?.with_path_style();
        Ok(*bucket)
    }

    /// `S3_ENDPOINT` / `S3_ACCESS_KEY` / `S3_SECRET_KEY` / `S3_BUCKET` から構築する。
    ///
    /// 未設定の値はローカルMinIO向けのデフォルトになる。
    pub fn from_env() -> anyhow::Result<Self> {
        let env_or = |name: &str, default: &str| {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        };
        let endpoint = env_or("S3_ENDPOINT", "http://localhost:9000");
        let bucket_name = env_or("S3_BUCKET", DEFAULT_BUCKET);

        tracing::info!(
            s3_endpoint = %endpoint,
            s3_bucket = %bucket_name,
            "オブジェクト保存先にS3互換ストレージを使用します"
        );
        let bucket = Self::open_bucket(
            &endpoint,
            &env_or("S3_ACCESS_KEY", "minioadmin"),
            &env_or("S3_SECRET_KEY", "minioadmin"),
            &bucket_name,
        )?;
        Ok(Self::new(bucket))
    }

    fn data_key(resource_id: &str) -> String {
        format!("{OBJECT_PREFIX}/{resource_id}")
    }

    fn metadata_key(resource_id: &str) -> String {
        format!("{OBJECT_PREFIX}/{resource_id}.json")
    }

    /// オブジェクトを取得する。404は `None`。
    async fn fetch(&self, key: &str) -> Result<Option<Bytes>, GatewayError> {
        match self.bucket.get_object(key).await {
            Ok(response) if response.status_code() == 404 => Ok(None),
            Ok(response) if (200..300).contains(&response.status_code()) => {
                Ok(Some(response.bytes().clone()))
            }
            Ok(response) => Err(GatewayError::Storage(format!(
                "オブジェクト取得でHTTPエラー ({key}): {}",
                response.status_code()
            ))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(GatewayError::Storage(format!(
                "オブジェクト取得に失敗 ({key}): {e}"
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, GatewayError> {
        match self.bucket.head_object(key).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) if (200..300).contains(&code) => Ok(true),
            Ok((_, code)) => Err(GatewayError::Storage(format!(
                "オブジェクト確認でHTTPエラー ({key}): {code}"
            ))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(GatewayError::Storage(format!(
                "オブジェクト確認に失敗 ({key}): {e}"
            ))),
        }
    }

    async fn upload(
        &self,
        key: &str,
        content: &[u8],
        content_type: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .bucket
            .put_object_with_content_type(key, content, content_type)
            .await
            .map_err(|e| GatewayError::Storage(format!("オブジェクト保存に失敗 ({key}): {e}")))?;
        if !(200..300).contains(&response.status_code()) {
            return Err(GatewayError::Storage(format!(
                "オブジェクト保存でHTTPエラー ({key}): {}",
                response.status_code()
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    fn backend(&self) -> &'static str {
        "s3"
    }

    async fn put_new(&self, resource_id: &str, blob: StoredBlob) -> Result<bool, GatewayError> {
        if !is_valid_resource_id(resource_id) {
            return Err(GatewayError::Storage(format!(
                "不正なリソースID: {resource_id}"
            )));
        }
        // S3には条件付き作成がないため事前確認のみ。IDはランダム生成なので衝突は実質起きない。
        if self.exists(&Self::metadata_key(resource_id)).await? {
            return Ok(false);
        }

        self.upload(&Self::data_key(resource_id), &blob.bytes, &blob.content_type)
            .await?;

        let metadata = serde_json::to_vec(&BlobMetadata::of(&blob))
            .map_err(|e| GatewayError::Internal(format!("メタデータのシリアライズに失敗: {e}")))?;
        self.upload(&Self::metadata_key(resource_id), &metadata, "application/json")
            .await?;

        Ok(true)
    }

    async fn get(&self, resource_id: &str) -> Result<Option<StoredBlob>, GatewayError> {
        if !is_valid_resource_id(resource_id) {
            return Ok(None);
        }

        let Some(raw_metadata) = self.fetch(&Self::metadata_key(resource_id)).await? else {
            return Ok(None);
        };
        let metadata: BlobMetadata = serde_json::from_slice(&raw_metadata)
            .map_err(|e| GatewayError::Storage(format!("メタデータのパースに失敗: {e}")))?;

        let Some(bytes) = self.fetch(&Self::data_key(resource_id)).await? else {
            return Ok(None);
        };

        Ok(Some(metadata.into_blob(bytes)))
    }
}
