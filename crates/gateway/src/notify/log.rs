//! # ログシンク
//!
//! 送信先が設定されていない場合に使用する。イベントをログに出力するだけ。

use parcel_types::EventEnvelope;

use super::{DeliveryError, EventSink};

/// イベントをinfoレベルでログ出力するシンク。
pub struct LogSink;

#[async_trait::async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, envelope: &EventEnvelope) -> Result<(), DeliveryError> {
        tracing::info!(
            event_type = %envelope.event_type,
            resource_id = %envelope.data.id,
            resource_name = envelope.data.name.as_deref().unwrap_or(""),
            emitted_at = envelope.data.emitted_at,
            "変更イベント"
        );
        Ok(())
    }
}
