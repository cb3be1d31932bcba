//! # Webhookシンク
//!
//! 外部コンシューマ（Worker等）へ `{type, data}` をHTTP POSTする。
//! 応答の遅い・到達できないシンクで送信タスクが詰まらないよう、
//! リクエストごとにタイムアウトを設定する。

use std::time::Duration;

use parcel_types::EventEnvelope;

use super::{DeliveryError, EventSink};

/// HTTP POSTで送信するシンク。
pub struct WebhookSink {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookSink {
    /// 送信先URLとリクエストタイムアウトを指定して構築する。
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, http_client })
    }
}

#[async_trait::async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, envelope: &EventEnvelope) -> Result<(), DeliveryError> {
        let response = self
            .http_client
            .post(&self.url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(format!("{} への送信失敗: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}
