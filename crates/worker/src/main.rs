//! # Parcel Worker
//!
//! Gatewayの変更通知（`NOTIFY_URL`）と検証サンプル（`VALIDATOR_URL`）の受信先。
//! 変更通知は受信時刻を付けてメモリに保持し、一覧で返す。
//! 検証サンプルはスキーマを確認してディスクに保存する。
//!
//! ## API エンドポイント
//! - `POST /events`: イベント受信（202）
//! - `GET /events`: 受信済みイベント一覧
//! - `POST /validate`: 検証サンプルの受信（204 / 400）
//! - `GET /health`: ヘルスチェック

mod config;
mod error;
mod events;
mod validate;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};

use config::{WorkerConfig, WorkerState};
use events::{handle_health, handle_list_events, handle_receive_event};
use validate::handle_validate;

/// 検証サンプル本文の上限
const VALIDATE_BODY_LIMIT: usize = 1024 * 1024;

/// Workerのルーターを構築する。
fn build_router(state: Arc<WorkerState>) -> axum::Router {
    axum::Router::new()
        .route("/health", get(handle_health))
        .route(
            "/events",
            get(handle_list_events).post(handle_receive_event),
        )
        .route(
            "/validate",
            post(handle_validate).layer(DefaultBodyLimit::max(VALIDATE_BODY_LIMIT)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = WorkerConfig::from_env()?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        event_capacity = config.event_capacity,
        "Worker設定を読み込みました"
    );
    let app = build_router(Arc::new(config.build_state()));

    tracing::info!("Workerを {} で起動します", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use base64::Engine;

    use super::*;
    use crate::events::EventLog;
    use crate::validate::{object_name, ValidatedStore};

    /// 一時ディレクトリを保存先にしてWorkerを起動する。
    async fn serve_in(dir: &std::path::Path) -> String {
        let state = WorkerState {
            events: EventLog::new(),
            validated: ValidatedStore::new(dir),
        };
        let app = build_router(Arc::new(state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        format!("http://127.0.0.1:{port}")
    }

    async fn serve() -> (tempfile::TempDir, String) {
        let tmp = tempfile::tempdir().unwrap();
        let base = serve_in(tmp.path()).await;
        (tmp, base)
    }

    #[tokio::test]
    async fn test_receive_and_list_events() {
        let (_tmp, base) = serve().await;
        let client = reqwest::Client::new();

        let event = serde_json::json!({
            "type": "file.created",
            "data": {"id": "abc", "name": "report.pdf", "emittedAt": 1}
        });
        let response = client
            .post(format!("{base}/events"))
            .json(&event)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "accepted");

        let listed: Vec<serde_json::Value> = client
            .get(format!("{base}/events"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["type"], "file.created");
        assert_eq!(listed[0]["data"]["name"], "report.pdf");
        assert!(listed[0]["receivedAt"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_rejects_non_object_body() {
        let (_tmp, base) = serve().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/events"))
            .header("content-type", "application/json")
            .body("[1,2]")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let (_tmp, base) = serve().await;
        let body: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    fn push_body(sample: &serde_json::Value) -> serde_json::Value {
        let data = base64::engine::general_purpose::STANDARD.encode(sample.to_string());
        serde_json::json!({"message": {"data": data}})
    }

    /// 正しいサンプルは204で保存され、壊れたサンプルは400で何も残らない
    #[tokio::test]
    async fn test_validate_accepts_and_rejects() {
        let (tmp, base) = serve().await;
        let client = reqwest::Client::new();

        let sample = serde_json::json!({
            "id": "5d1c2b3a-0000-4000-8000-000000000001",
            "timestamp": "2026-10-18T09:30:00.125Z",
            "schemaVersion": "1",
            "payload": {"message": "hello-world"}
        });
        let response = client
            .post(format!("{base}/validate"))
            .json(&push_body(&sample))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);

        let saved = tmp
            .path()
            .join(object_name("5d1c2b3a-0000-4000-8000-000000000001"));
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(saved).unwrap()).unwrap();
        assert_eq!(written, sample);

        let mut bad = sample.clone();
        bad["id"] = serde_json::json!("other");
        bad["timestamp"] = serde_json::json!("not-a-date");
        let response = client
            .post(format!("{base}/validate"))
            .json(&push_body(&bad))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        assert!(response.text().await.unwrap().contains("timestamp invalid"));
        assert!(!tmp.path().join(object_name("other")).exists());

        let response = client
            .post(format!("{base}/validate"))
            .json(&serde_json::json!({"message": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }
}
