//! # POST /validate
//!
//! Gatewayが発行した検証サンプルを受け取り、スキーマを確認して保存する。
//!
//! 本文は `{"message": {"data": <Base64>}}`。`data` を復号したJSONが
//! `{id, timestamp, schemaVersion, payload}` の条件を満たせば
//! `validated/{安全化したID}-{SHA-256先頭12桁}.json` に整形JSONで書き出し、204を返す。
//! 条件を満たさない場合は400。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use base64::Engine;
use parcel_types::{PushEnvelope, ValidationSample};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::WorkerState;
use crate::error::WorkerError;

/// 保存先のサブディレクトリ
const VALIDATED_DIR: &str = "validated";

/// ファイル名に付けるハッシュの桁数
const HASH_PREFIX_LEN: usize = 12;

// ---------------------------------------------------------------------------
// 保存先
// ---------------------------------------------------------------------------

/// 検証済みサンプルの保存先。
pub struct ValidatedStore {
    root: PathBuf,
}

impl ValidatedStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// サンプルを整形JSONで保存し、ルートからの相対名を返す。
    /// 同じIDは同じファイルに上書きされる。
    pub async fn save(&self, sample: &ValidationSample) -> Result<String, WorkerError> {
        let name = object_name(&sample.id);
        let path = self.root.join(&name);
        let tmp_path = path.with_extension("json.tmp");
        let io_err = |e: std::io::Error| WorkerError::Internal(format!("保存に失敗: {e}"));

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(sample)
            .map_err(|e| WorkerError::Internal(format!("シリアライズに失敗: {e}")))?;

        if let Err(e) = tokio::fs::write(&tmp_path, &json).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_err(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(io_err(e));
        }
        Ok(name)
    }
}

/// IDから保存名を決める。英数字・`_`・`-` 以外は落とし、
/// 衝突を避けるため元のIDのSHA-256を付ける。
pub fn object_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    let safe = if safe.is_empty() { "id".to_string() } else { safe };
    let digest = hex::encode(Sha256::digest(id.as_bytes()));
    format!("{VALIDATED_DIR}/{safe}-{}.json", &digest[..HASH_PREFIX_LEN])
}

// ---------------------------------------------------------------------------
// 検証
// ---------------------------------------------------------------------------

/// 封筒を開き、`message.data` を復号したJSONを返す。
pub fn decode_push(body: &[u8]) -> Result<Value, WorkerError> {
    let envelope: PushEnvelope = serde_json::from_slice(body)
        .ok()
        .filter(|envelope: &PushEnvelope| !envelope.message.data.is_empty())
        .ok_or_else(|| WorkerError::BadRequest("missing message.data".to_string()))?;

    let raw = base64::engine::general_purpose::STANDARD
        .decode(envelope.message.data.trim())
        .map_err(|e| WorkerError::BadRequest(format!("message.dataのBase64復号に失敗: {e}")))?;
    serde_json::from_slice(&raw)
        .map_err(|e| WorkerError::BadRequest(format!("message.dataがJSONではありません: {e}")))
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field)?.as_str().filter(|s| !s.is_empty())
}

/// スキーマを確認してサンプルに変換する。
///
/// - `id`: 空でない文字列
/// - `timestamp`: RFC 3339 の日時文字列
/// - `schemaVersion`: 空でない文字列
/// - `payload`: JSONオブジェクトまたは配列
pub fn check_sample(value: &Value) -> Result<ValidationSample, WorkerError> {
    let bad = |msg: &str| WorkerError::BadRequest(msg.to_string());

    let id = non_empty_str(value, "id").ok_or_else(|| bad("id missing"))?;
    let timestamp = non_empty_str(value, "timestamp")
        .filter(|ts| chrono::DateTime::parse_from_rfc3339(ts).is_ok())
        .ok_or_else(|| bad("timestamp invalid"))?;
    let schema_version =
        non_empty_str(value, "schemaVersion").ok_or_else(|| bad("schemaVersion invalid"))?;
    let payload = value
        .get("payload")
        .filter(|p| p.is_object() || p.is_array())
        .ok_or_else(|| bad("payload invalid"))?;

    Ok(ValidationSample {
        id: id.to_string(),
        timestamp: timestamp.to_string(),
        schema_version: schema_version.to_string(),
        payload: payload.clone(),
    })
}

/// POST /validate: サンプルの検証と保存。
pub async fn handle_validate(
    State(state): State<Arc<WorkerState>>,
    body: Bytes,
) -> Result<StatusCode, WorkerError> {
    let decoded = decode_push(&body)?;
    let sample = match check_sample(&decoded) {
        Ok(sample) => sample,
        Err(e) => {
            tracing::warn!(error = %e, "検証サンプルを拒否しました");
            return Err(e);
        }
    };

    let saved = state.validated.save(&sample).await?;
    tracing::info!(sample_id = %sample.id, object = %saved, "検証サンプルを保存しました");
    Ok(StatusCode::NO_CONTENT)
}
