//! # Gateway設定・共有状態
//!
//! 環境変数からの設定読み込みとGatewayの共有状態の定義。

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::items::{ItemRepository, MemoryItemRepository};
use crate::notify::{EventSink, LogSink, NotificationEmitter, WebhookSink};
use crate::secret::SecretStore;
use crate::storage::{BlobStore, LocalBlobStore, MemoryBlobStore};
use crate::validation::SamplePublisher;

/// ダウンロードURLのデフォルト有効期間（秒）
pub const DEFAULT_LINK_TTL_SECS: u64 = 600;
/// アップロード最大サイズのデフォルト（25MiB）
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;
/// 通知送信タイムアウトのデフォルト（秒）
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 5;
/// 通知キュー容量のデフォルト
pub const DEFAULT_NOTIFY_QUEUE_CAPACITY: usize = 1024;
/// 検証サービス送信タイムアウトのデフォルト（秒）
pub const DEFAULT_VALIDATOR_TIMEOUT_SECS: u64 = 5;

/// Blob Storageの実装種別。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "local" => Ok(StorageBackend::Local),
            "s3" => Ok(StorageBackend::S3),
            other => Err(anyhow::anyhow!(
                "STORAGE_BACKENDが不正です: {other} (memory / local / s3)"
            )),
        }
    }
}

/// 環境変数から読み込むGateway設定。
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// 待ち受けアドレス
    pub listen_addr: String,
    /// ダウンロードURLの組み立てに使う外部公開URL
    pub public_base_url: String,
    /// 署名用秘密鍵の格納ディレクトリ
    pub secret_dir: PathBuf,
    /// ダウンロードURLの有効期間（秒）
    pub link_ttl_secs: u64,
    /// アップロード最大サイズ（バイト）
    pub max_upload_bytes: u64,
    /// Blob Storageの実装
    pub storage_backend: StorageBackend,
    /// `local` 実装の保存先ディレクトリ
    pub storage_dir: PathBuf,
    /// 変更通知の送信先URL。未設定ならログ出力のみ
    pub notify_url: Option<String>,
    /// 変更通知の送信タイムアウト（秒）
    pub notify_timeout_secs: u64,
    /// 変更通知キューの容量
    pub notify_queue_capacity: usize,
    /// 検証サンプルの送信先URL。未設定ならサンプル発行は500を返す
    pub validator_url: Option<String>,
    /// 検証サービス送信タイムアウト（秒）
    pub validator_timeout_secs: u64,
}

/// 数値の環境変数を読む。未設定ならデフォルト、不正値はエラー。
fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name}の値が不正です ({raw}): {e}")),
        Err(_) => Ok(default),
    }
}

impl GatewayConfig {
    /// 環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        let optional_url =
            |name: &str| std::env::var(name).ok().filter(|url| !url.trim().is_empty());

        Ok(Self {
            listen_addr: std::env::var("GATEWAY_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            secret_dir: std::env::var("SECRET_DIR")
                .unwrap_or_else(|_| "./data/secret".to_string())
                .into(),
            link_ttl_secs: env_parse("LINK_TTL_SECS", DEFAULT_LINK_TTL_SECS)?,
            max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            storage_backend: env_parse("STORAGE_BACKEND", StorageBackend::Memory)?,
            storage_dir: std::env::var("STORAGE_DIR")
                .unwrap_or_else(|_| "./data/blobs".to_string())
                .into(),
            notify_url: optional_url("NOTIFY_URL"),
            notify_timeout_secs: env_parse("NOTIFY_TIMEOUT_SECS", DEFAULT_NOTIFY_TIMEOUT_SECS)?,
            notify_queue_capacity: env_parse(
                "NOTIFY_QUEUE_CAPACITY",
                DEFAULT_NOTIFY_QUEUE_CAPACITY,
            )?,
            validator_url: optional_url("VALIDATOR_URL"),
            validator_timeout_secs: env_parse(
                "VALIDATOR_TIMEOUT_SECS",
                DEFAULT_VALIDATOR_TIMEOUT_SECS,
            )?,
        })
    }

    /// 設定に従って各実装を選択し、共有状態を構築する。
    ///
    /// 通知タスクを起動するため、tokioランタイム内で呼ぶこと。
    pub fn build_state(&self) -> anyhow::Result<GatewayState> {
        let blob_store: Box<dyn BlobStore> = match self.storage_backend {
            StorageBackend::Memory => Box::new(MemoryBlobStore::new()),
            StorageBackend::Local => Box::new(LocalBlobStore::new(&self.storage_dir)),
            #[cfg(feature = "vendor-aws")]
            StorageBackend::S3 => Box::new(crate::storage::S3BlobStore::from_env()?),
            #[cfg(not(feature = "vendor-aws"))]
            StorageBackend::S3 => {
                anyhow::bail!("S3バックエンドは vendor-aws フィーチャーなしでは利用できません")
            }
        };

        let sink: Box<dyn EventSink> = match &self.notify_url {
            Some(url) => {
                tracing::info!(notify_url = %url, "変更通知をWebhookで送信します");
                Box::new(WebhookSink::new(
                    url.clone(),
                    Duration::from_secs(self.notify_timeout_secs),
                )?)
            }
            None => {
                tracing::warn!("NOTIFY_URLが未設定です。変更通知はログ出力のみ行います");
                Box::new(LogSink)
            }
        };

        let sample_publisher = match &self.validator_url {
            Some(url) => Some(SamplePublisher::new(
                url.clone(),
                Duration::from_secs(self.validator_timeout_secs),
            )?),
            None => None,
        };

        Ok(GatewayState {
            public_base_url: self.public_base_url.clone(),
            link_ttl_secs: self.link_ttl_secs,
            max_upload_bytes: self.max_upload_bytes,
            secret_store: SecretStore::new(&self.secret_dir),
            blob_store,
            items: Box::new(MemoryItemRepository::new()),
            notifier: NotificationEmitter::spawn(sink, self.notify_queue_capacity),
            sample_publisher,
        })
    }
}

/// Gatewayの共有状態。
pub struct GatewayState {
    /// ダウンロードURLの組み立てに使う外部公開URL
    pub public_base_url: String,
    /// ダウンロードURLの有効期間（秒）
    pub link_ttl_secs: u64,
    /// アップロード最大サイズ（バイト）
    pub max_upload_bytes: u64,
    /// 署名用秘密鍵ストア
    pub secret_store: SecretStore,
    /// Blob Storage（トレイトで抽象化）
    pub blob_store: Box<dyn BlobStore>,
    /// アイテムリポジトリ（トレイトで抽象化）
    pub items: Box<dyn ItemRepository>,
    /// 変更通知の発行口
    pub notifier: NotificationEmitter,
    /// 検証サンプルの送信口（未設定なら `None`）
    pub sample_publisher: Option<SamplePublisher>,
}
