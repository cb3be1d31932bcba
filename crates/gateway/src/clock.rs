//! # 時刻ユーティリティ

use crate::error::GatewayError;

/// 現在時刻（UNIXエポックからのミリ秒）。
pub fn now_millis() -> Result<u64, GatewayError> {
    parcel_types::now_millis()
        .ok_or_else(|| GatewayError::Internal("システム時刻を取得できません".to_string()))
}
