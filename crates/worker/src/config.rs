//! # Worker設定・共有状態

use std::path::PathBuf;
use std::str::FromStr;

use crate::events::EventLog;
use crate::validate::ValidatedStore;

/// 保持する受信イベント数のデフォルト
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// 環境変数から読み込むWorker設定。
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// 待ち受けアドレス
    pub listen_addr: String,
    /// 検証済みサンプルの保存先ディレクトリ
    pub data_dir: PathBuf,
    /// 保持する受信イベント数の上限。超えた分は古い順に捨てる
    pub event_capacity: usize,
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{name}の値が不正です ({raw}): {e}")),
        Err(_) => Ok(default),
    }
}

impl WorkerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            listen_addr: std::env::var("WORKER_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8081".to_string()),
            data_dir: std::env::var("WORKER_DATA_DIR")
                .unwrap_or_else(|_| "./data/worker".to_string())
                .into(),
            event_capacity: env_parse("WORKER_EVENT_CAPACITY", DEFAULT_EVENT_CAPACITY)?,
        })
    }

    pub fn build_state(&self) -> WorkerState {
        WorkerState {
            events: EventLog::with_capacity(self.event_capacity),
            validated: ValidatedStore::new(&self.data_dir),
        }
    }
}

/// Workerの共有状態。
pub struct WorkerState {
    /// 受信した変更通知
    pub events: EventLog,
    /// 検証済みサンプルの保存先
    pub validated: ValidatedStore,
}
