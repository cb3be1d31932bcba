//! # Worker エラー型

use axum::http::StatusCode;

/// Workerエラー型。
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// 不正なリクエスト
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl axum::response::IntoResponse for WorkerError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            WorkerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WorkerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "リクエスト処理に失敗");
        }
        (status, self.to_string()).into_response()
    }
}
