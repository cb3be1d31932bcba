//! # ヘルスチェック・サービス情報

use axum::Json;
use parcel_types::StatusResponse;

/// GET /health/live
pub async fn handle_live() -> Json<StatusResponse> {
    Json(StatusResponse::new("alive"))
}

/// GET /health/ready
pub async fn handle_ready() -> Json<StatusResponse> {
    Json(StatusResponse::new("ready"))
}

/// GET /: サービス名・バージョン・エンドポイント一覧。
pub async fn handle_index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health/ready",
            "files": "/v1/files",
            "items": "/v1/items",
            "validateSample": "/v1/validate/sample",
        }
    }))
}
