//! # POST /events, GET /events
//!
//! Gatewayから届く変更通知を受信順にメモリへ蓄積する。
//! 本文は `{type, data}` 形式を想定するが、任意のJSONオブジェクトを受け付ける。
//! 保持件数には上限があり、超えると古いものから捨てる。

use std::collections::VecDeque;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use parcel_types::{EventEnvelope, StatusResponse};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::{WorkerState, DEFAULT_EVENT_CAPACITY};
use crate::error::WorkerError;

/// 受信時刻を格納するフィールド名
pub const RECEIVED_AT_FIELD: &str = "receivedAt";

/// 受信済みイベントの記録。
pub struct EventLog {
    events: RwLock<VecDeque<Value>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// 最大 `capacity` 件（最低1件）を保持するログを作る。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// 受信時刻を付与して末尾に追加する。記録した値を返す。
    pub async fn record(&self, body: &[u8], received_at: u64) -> Result<Value, WorkerError> {
        let mut value: Value = serde_json::from_slice(body)
            .map_err(|e| WorkerError::BadRequest(format!("JSONのパースに失敗: {e}")))?;
        let object = value.as_object_mut().ok_or_else(|| {
            WorkerError::BadRequest("イベントはJSONオブジェクトである必要があります".to_string())
        })?;
        object.insert(RECEIVED_AT_FIELD.to_string(), Value::from(received_at));

        let mut events = self.events.write().await;
        while events.len() >= self.capacity {
            events.pop_front();
            tracing::debug!(capacity = self.capacity, "最古のイベントを破棄しました");
        }
        events.push_back(value.clone());
        Ok(value)
    }

    /// 受信順のスナップショット。
    pub async fn snapshot(&self) -> Vec<Value> {
        self.events.read().await.iter().cloned().collect()
    }
}

fn now_millis() -> Result<u64, WorkerError> {
    parcel_types::now_millis()
        .ok_or_else(|| WorkerError::Internal("システム時刻を取得できません".to_string()))
}

/// POST /events: 変更通知の受信。
pub async fn handle_receive_event(
    State(state): State<Arc<WorkerState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<StatusResponse>), WorkerError> {
    let recorded = state.events.record(&body, now_millis()?).await?;

    // Gatewayの形式であれば種別とIDをログに出す
    match serde_json::from_value::<EventEnvelope>(recorded.clone()) {
        Ok(envelope) => tracing::info!(
            event_type = %envelope.event_type,
            id = %envelope.data.id,
            name = ?envelope.data.name,
            emitted_at = envelope.data.emitted_at,
            "イベントを受信しました"
        ),
        Err(_) => tracing::info!(event = %recorded, "形式外のイベントを受信しました"),
    }

    Ok((StatusCode::ACCEPTED, Json(StatusResponse::new("accepted"))))
}

/// GET /events: 受信済みイベント一覧。
pub async fn handle_list_events(State(state): State<Arc<WorkerState>>) -> Json<Vec<Value>> {
    Json(state.events.snapshot().await)
}

/// GET /health
pub async fn handle_health() -> Json<StatusResponse> {
    Json(StatusResponse::new("ok"))
}
