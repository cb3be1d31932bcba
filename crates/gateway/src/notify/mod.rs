//! # 変更通知
//!
//! 変更（作成・更新・削除）成功後に、外部シンクへベストエフォートでイベントを送る。
//!
//! `emit` はキューに積むだけで即座に戻り、失敗を呼び出し元へ返さない。
//! 送信はバックグラウンドタスクが行い、失敗はログに記録して破棄する。
//! 再送・順序保証・到達確認は行わない。
//!
//! ## シンク実装
//! - `WebhookSink`: HTTP POSTで `{type, data}` を送る（タイムアウト付き）
//! - `LogSink`: ログ出力のみ（送信先未設定時）

pub mod log;
pub mod webhook;

pub use self::log::LogSink;
pub use webhook::WebhookSink;

use parcel_types::{EventEnvelope, MutationEvent, MutationKind, ResourceKind};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::clock::now_millis;

/// イベント送信のエラー型。呼び出し元には決して返らない。
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// 接続失敗・タイムアウト等
    #[error("送信に失敗: {0}")]
    Transport(String),
    /// シンクが非2xxを返した
    #[error("シンクがエラーを返しました: HTTP {0}")]
    Rejected(u16),
}

/// 変更通知の送信先。
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// シンク名（ログ出力用）。
    fn name(&self) -> &'static str;

    /// エンベロープを1件送信する。
    async fn deliver(&self, envelope: &EventEnvelope) -> Result<(), DeliveryError>;
}

/// 変更通知の発行口。
///
/// クローンは同じバックグラウンドタスクへのキューを共有する。
#[derive(Clone)]
pub struct NotificationEmitter {
    queue: mpsc::Sender<MutationEvent>,
}

impl NotificationEmitter {
    /// 送信タスクを起動し、発行口を返す。tokioランタイム内で呼ぶこと。
    ///
    /// `capacity` を超えて溜まったイベントは破棄される。
    pub fn spawn(sink: Box<dyn EventSink>, capacity: usize) -> Self {
        let (queue, receiver) = mpsc::channel(capacity.max(1));
        tracing::info!(sink = sink.name(), capacity, "変更通知タスクを起動します");
        tokio::spawn(run_delivery(sink, receiver));
        Self { queue }
    }

    /// イベントをキューに積む。ブロックせず、失敗しない。
    pub fn emit(&self, event: MutationEvent) {
        match self.queue.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    event_type = %event.event_type(),
                    resource_id = %event.resource_id,
                    "通知キューが満杯のためイベントを破棄しました"
                );
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(
                    event_type = %event.event_type(),
                    resource_id = %event.resource_id,
                    "通知タスクが停止しているためイベントを破棄しました"
                );
            }
        }
    }

    /// 現在時刻でイベントを組み立てて発行する。
    pub fn emit_mutation(
        &self,
        kind: MutationKind,
        resource: ResourceKind,
        resource_id: &str,
        resource_name: Option<&str>,
    ) {
        let emitted_at = match now_millis() {
            Ok(now) => now,
            Err(e) => {
                tracing::warn!(error = %e, "時刻取得に失敗したためイベントを破棄しました");
                return;
            }
        };
        self.emit(MutationEvent {
            kind,
            resource,
            resource_id: resource_id.to_string(),
            resource_name: resource_name.map(str::to_string),
            emitted_at,
        });
    }
}

async fn run_delivery(sink: Box<dyn EventSink>, mut receiver: mpsc::Receiver<MutationEvent>) {
    while let Some(event) = receiver.recv().await {
        let envelope = event.to_envelope();
        match sink.deliver(&envelope).await {
            Ok(()) => {
                tracing::debug!(
                    sink = sink.name(),
                    event_type = %envelope.event_type,
                    resource_id = %envelope.data.id,
                    "変更通知を送信しました"
                );
            }
            Err(e) => {
                tracing::warn!(
                    sink = sink.name(),
                    event_type = %envelope.event_type,
                    resource_id = %envelope.data.id,
                    error = %e,
                    "変更通知の送信に失敗しました（破棄）"
                );
            }
        }
    }
    tracing::debug!(sink = sink.name(), "変更通知タスクを終了します");
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Mutex;

    use super::*;

    /// 受け取ったエンベロープを記録するテスト用シンク。
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub(crate) received: Arc<Mutex<Vec<EventEnvelope>>>,
    }

    impl RecordingSink {
        /// `count` 件届くまで待つ（最大1秒）。
        pub(crate) async fn wait_for(&self, count: usize) -> Vec<EventEnvelope> {
            for _ in 0..100 {
                {
                    let received = self.received.lock().await;
                    if received.len() >= count {
                        return received.clone();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            self.received.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn deliver(&self, envelope: &EventEnvelope) -> Result<(), DeliveryError> {
            self.received.lock().await.push(envelope.clone());
            Ok(())
        }
    }

    /// 常に失敗するシンク。呼び出し回数を数える。
    struct FailingSink {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl EventSink for FailingSink {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn deliver(&self, _envelope: &EventEnvelope) -> Result<(), DeliveryError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(DeliveryError::Transport("unreachable".to_string()))
        }
    }

    /// 応答しないシンク。
    struct StalledSink;

    #[async_trait::async_trait]
    impl EventSink for StalledSink {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn deliver(&self, _envelope: &EventEnvelope) -> Result<(), DeliveryError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn event(id: &str) -> MutationEvent {
        MutationEvent {
            kind: MutationKind::Created,
            resource: ResourceKind::Item,
            resource_id: id.to_string(),
            resource_name: Some("widget".to_string()),
            emitted_at: 1,
        }
    }

    #[tokio::test]
    async fn test_emitted_events_reach_sink() {
        let sink = RecordingSink::default();
        let emitter = NotificationEmitter::spawn(Box::new(sink.clone()), 16);

        emitter.emit(event("a"));
        emitter.emit_mutation(MutationKind::Deleted, ResourceKind::File, "b", None);

        let received = sink.wait_for(2).await;
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].event_type, "item.created");
        assert_eq!(received[1].event_type, "file.deleted");
        assert_eq!(received[1].data.id, "b");
        assert!(received[1].data.emitted_at > 0);
    }

    /// 送信失敗は再送されず、後続イベントの送信も続くことを確認
    #[tokio::test]
    async fn test_failures_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let emitter = NotificationEmitter::spawn(
            Box::new(FailingSink {
                attempts: attempts.clone(),
            }),
            16,
        );

        for i in 0..3 {
            emitter.emit(event(&i.to_string()));
        }

        for _ in 0..100 {
            if attempts.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    /// シンクが応答しなくても emit がブロックしないことを確認
    #[tokio::test]
    async fn test_emit_never_blocks_on_stalled_sink() {
        let emitter = NotificationEmitter::spawn(Box::new(StalledSink), 2);

        let result = tokio::time::timeout(Duration::from_secs(1), async {
            for i in 0..100 {
                emitter.emit(event(&i.to_string()));
            }
        })
        .await;
        assert!(result.is_ok(), "emit がブロックした");
    }
}
