//! # テスト用共通ヘルパー
//!
//! 各モジュールのテストで共有するGateway状態とサーバー起動処理。

use std::sync::Arc;

use parcel_types::DownloadQuery;

use crate::config::{GatewayState, DEFAULT_LINK_TTL_SECS};
use crate::items::MemoryItemRepository;
use crate::notify::{EventSink, LogSink, NotificationEmitter};
use crate::secret::SecretStore;
use crate::storage::{BlobStore, MemoryBlobStore};

/// アップロード上限（テスト用）
pub const TEST_MAX_UPLOAD_BYTES: u64 = 1024;

/// メモリ内ストレージとログシンクでGateway状態を構築する。
///
/// 返す `TempDir` は秘密鍵ディレクトリを保持しているため、テスト終了まで保持すること。
pub fn test_state() -> (tempfile::TempDir, Arc<GatewayState>) {
    test_state_with_sink(Box::new(LogSink))
}

/// 指定したシンクでGateway状態を構築する。
pub fn test_state_with_sink(sink: Box<dyn EventSink>) -> (tempfile::TempDir, Arc<GatewayState>) {
    let tmp = tempfile::tempdir().unwrap();
    let secret_store = SecretStore::new(tmp.path().join("secret"));
    let state = state_with_stores(secret_store, Box::new(MemoryBlobStore::new()), sink);
    (tmp, state)
}

/// 秘密鍵ストアとBlob Storageを指定してGateway状態を構築する。
pub fn state_with_stores(
    secret_store: SecretStore,
    blob_store: Box<dyn BlobStore>,
    sink: Box<dyn EventSink>,
) -> Arc<GatewayState> {
    Arc::new(GatewayState {
        public_base_url: "http://localhost:8080".to_string(),
        link_ttl_secs: DEFAULT_LINK_TTL_SECS,
        max_upload_bytes: TEST_MAX_UPLOAD_BYTES,
        secret_store,
        blob_store,
        items: Box::new(MemoryItemRepository::new()),
        notifier: NotificationEmitter::spawn(sink, 16),
        sample_publisher: None,
    })
}

/// ダウンロードURLのクエリから `expires` / `token` を取り出す。
pub fn download_query(url: &str) -> DownloadQuery {
    let parsed = reqwest::Url::parse(url).unwrap();
    let mut query = DownloadQuery::default();
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "expires" => query.expires = Some(value.into_owned()),
            "token" => query.token = Some(value.into_owned()),
            _ => {}
        }
    }
    query
}

/// ルーターを `127.0.0.1` の空きポートで起動し、ベースURLを返す。
pub async fn serve(state: Arc<GatewayState>) -> String {
    let app = crate::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}
