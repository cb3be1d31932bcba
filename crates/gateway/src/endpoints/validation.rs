//! # POST /v1/validate/sample
//!
//! 検証パイプラインの疎通確認用サンプルを発行する。

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use parcel_types::SampleQueued;

use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::validation::new_sample;

/// POST /v1/validate/sample: サンプルを検証サービスへ送り、IDを返す。
pub async fn handle_publish_sample(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<SampleQueued>, GatewayError> {
    let publisher = state
        .sample_publisher
        .as_ref()
        .ok_or_else(|| GatewayError::Internal("VALIDATOR_URLが未設定です".to_string()))?;

    let sample = new_sample(chrono::Utc::now());
    publisher.publish(&sample).await?;
    tracing::info!(sample_id = %sample.id, "検証サンプルを発行しました");

    Ok(Json(SampleQueued {
        status: "queued".to_string(),
        id: sample.id,
    }))
}
