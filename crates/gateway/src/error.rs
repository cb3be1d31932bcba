//! # Gateway エラー型
//!
//! 全エンドポイントで共通のエラー型。
//! 認可エラーは期限切れと署名不一致を区別せず、本文は常に "forbidden" とする。

use axum::http::StatusCode;

/// Gatewayエラー型。
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 署名用秘密鍵の取得・生成に失敗（設定エラー、運用者の対応が必要）
    #[error("署名用秘密鍵を利用できません: {0}")]
    Secret(String),
    /// ストレージ操作に失敗
    #[error("ストレージ操作に失敗: {0}")]
    Storage(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// ペイロードサイズ超過
    #[error("ペイロードサイズが上限を超えています: {0}")]
    PayloadTooLarge(String),
    /// 下流サービス（検証サービス等）への送信に失敗
    #[error("下流サービスへの送信に失敗: {0}")]
    Upstream(String),
    /// アクセス拒否（期限切れ・署名不一致）
    #[error("forbidden")]
    Forbidden,
    /// リソースが存在しない
    #[error("not found")]
    NotFound,
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            GatewayError::Secret(_) | GatewayError::Storage(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "リクエスト処理に失敗");
        }
        (status, self.to_string()).into_response()
    }
}
