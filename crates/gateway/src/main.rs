//! # Parcel Gateway
//!
//! ファイルを受け取って生成IDで保存し、再認証なしで期限付きダウンロードできる
//! 署名付きURLを返すGateway。
//!
//! ## 役割
//! - ファイル保存と署名付きダウンロードURLの発行
//! - ダウンロード時のトークン検証・有効期限チェック
//! - 署名用秘密鍵の生成・永続化
//! - アイテムのCRUD
//! - 変更（作成・更新・削除）の外部シンクへのベストエフォート通知
//! - 検証パイプラインへのサンプル発行
//!
//! ## API エンドポイント
//! - `POST /v1/files`: アップロード（multipart、`file` フィールド）
//! - `GET /v1/files/{resource_id}?expires=..&token=..`: ダウンロード
//! - `GET|POST /v1/items`, `GET|PUT|DELETE /v1/items/{id}`: アイテムCRUD
//! - `POST /v1/validate/sample`: 検証サービスへのサンプル発行
//! - `GET /health/live`, `GET /health/ready`: ヘルスチェック
//! - `GET /`: サービス情報

mod auth;
mod clock;
mod config;
mod endpoints;
mod error;
mod items;
mod notify;
mod secret;
mod storage;
#[cfg(test)]
mod test_helpers;
mod validation;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

use config::{GatewayConfig, GatewayState};
use endpoints::*;

/// multipartのヘッダー・境界文字列分の余裕
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Gatewayのルーターを構築する。
pub(crate) fn build_router(state: Arc<GatewayState>) -> axum::Router {
    let upload_body_limit = usize::try_from(state.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    axum::Router::new()
        .route("/", get(handle_index))
        .route("/health/live", get(handle_live))
        .route("/health/ready", get(handle_ready))
        .route(
            "/v1/files",
            post(handle_upload).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .route("/v1/files/{resource_id}", get(handle_download))
        .route(
            "/v1/items",
            get(handle_list_items).post(handle_create_item),
        )
        .route(
            "/v1/items/{id}",
            get(handle_get_item)
                .put(handle_update_item)
                .delete(handle_delete_item),
        )
        .route("/v1/validate/sample", post(handle_publish_sample))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(
        storage_backend = ?config.storage_backend,
        link_ttl_secs = config.link_ttl_secs,
        max_upload_bytes = config.max_upload_bytes,
        "Gateway設定を読み込みました"
    );

    let state = Arc::new(config.build_state()?);

    // 秘密鍵を起動時に用意しておく（書き込めない場合はここで停止する）
    state.secret_store.get_or_create().await?;

    let app = build_router(state);

    tracing::info!("Gatewayを {} で起動します", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// テスト
// ---------------------------------------------------------------------------
