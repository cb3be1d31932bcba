//! # 検証サンプルの発行
//!
//! `{id, timestamp, schemaVersion, payload}` 形式のサンプルを生成し、
//! プッシュ配信の封筒 `{"message": {"data": <Base64>}}` に包んで検証サービスへ送る。
//! 変更通知と異なり送信は同期的で、失敗は呼び出し元に返る。

use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use parcel_types::{PushEnvelope, PushMessage, ValidationSample, SAMPLE_SCHEMA_VERSION};

use crate::error::GatewayError;

/// 検証サービスへの送信口。
pub struct SamplePublisher {
    url: String,
    http_client: reqwest::Client,
}

impl SamplePublisher {
    /// 送信先URLとリクエストタイムアウトを指定して構築する。
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, http_client })
    }

    /// サンプルを1件送信する。2xx以外は `Upstream` エラー。
    pub async fn publish(&self, sample: &ValidationSample) -> Result<(), GatewayError> {
        let envelope = wrap_sample(sample)?;
        let response = self
            .http_client
            .post(&self.url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| GatewayError::Upstream(format!("{} への送信失敗: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Upstream(format!(
                "{} がHTTP {} を返しました",
                self.url,
                status.as_u16()
            )));
        }
        Ok(())
    }
}

/// `now` 時点の新しいサンプルを生成する。
pub fn new_sample(now: DateTime<Utc>) -> ValidationSample {
    ValidationSample {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        schema_version: SAMPLE_SCHEMA_VERSION.to_string(),
        payload: serde_json::json!({"message": "hello-world"}),
    }
}

fn wrap_sample(sample: &ValidationSample) -> Result<PushEnvelope, GatewayError> {
    let json = serde_json::to_vec(sample)
        .map_err(|e| GatewayError::Internal(format!("サンプルのシリアライズに失敗: {e}")))?;
    Ok(PushEnvelope {
        message: PushMessage {
            data: base64::engine::general_purpose::STANDARD.encode(json),
        },
    })
}
