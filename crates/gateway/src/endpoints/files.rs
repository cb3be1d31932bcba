//! # POST /v1/files, GET /v1/files/{resource_id}
//!
//! ファイルのアップロードと、署名付きURLによるダウンロード。

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use parcel_types::{DownloadQuery, MutationKind, ResourceKind, UploadResponse};

use crate::auth::{authorize_download, issue_download_link};
use crate::clock::now_millis;
use crate::config::GatewayState;
use crate::error::GatewayError;
use crate::storage::StoredBlob;

/// multipartのファイルフィールド名
const FILE_FIELD: &str = "file";
/// 表示名が空の場合に使う名前
const FALLBACK_DISPLAY_NAME: &str = "file";
/// Content-Typeが指定されない場合のMIMEタイプ
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
/// ID衝突時の再試行回数
const MAX_ID_ATTEMPTS: usize = 3;

/// POST /v1/files: ファイルアップロード。
///
/// multipartの `file` フィールドを保存し、署名付きダウンロードURLを返す。
pub async fn handle_upload(
    State(state): State<Arc<GatewayState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, GatewayError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let display_name = field
            .file_name()
            .map(sanitize_display_name)
            .filter(|name| !name.is_empty());
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let response = store_upload(
            &state,
            display_name.unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string()),
            content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            bytes,
        )
        .await?;
        return Ok(Json(response));
    }

    Err(GatewayError::BadRequest(format!(
        "multipartに {FILE_FIELD} フィールドがありません"
    )))
}

/// アップロード本体。秘密鍵取得 → 保存 → URL発行 → 作成イベント発行の順に行う。
pub(crate) async fn store_upload(
    state: &GatewayState,
    display_name: String,
    content_type: String,
    bytes: Bytes,
) -> Result<UploadResponse, GatewayError> {
    let size = bytes.len() as u64;
    if size > state.max_upload_bytes {
        return Err(GatewayError::PayloadTooLarge(format!(
            "{size} bytes (上限: {} bytes)",
            state.max_upload_bytes
        )));
    }

    // 秘密鍵は保存前に確定させる（保存後は設定エラーで失敗しない）
    let secret = state.secret_store.get_or_create().await?;

    let blob = StoredBlob {
        bytes,
        display_name: display_name.clone(),
        content_type,
    };

    let mut stored_id = None;
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = uuid::Uuid::new_v4().to_string();
        if state.blob_store.put_new(&candidate, blob.clone()).await? {
            stored_id = Some(candidate);
            break;
        }
        tracing::warn!(resource_id = %candidate, "リソースIDが衝突したため再生成します");
    }
    let resource_id = stored_id.ok_or_else(|| {
        GatewayError::Storage("一意なリソースIDを確保できませんでした".to_string())
    })?;

    let link = issue_download_link(state, secret, &resource_id, now_millis()?)?;

    tracing::info!(
        resource_id = %resource_id,
        display_name = %display_name,
        size,
        backend = state.blob_store.backend(),
        "ファイルを保存しました"
    );
    state.notifier.emit_mutation(
        MutationKind::Created,
        ResourceKind::File,
        &resource_id,
        Some(&display_name),
    );

    Ok(UploadResponse {
        resource_id,
        display_name,
        size,
        download_url: link.url,
        expires_at: link.expires_at,
    })
}

/// GET /v1/files/{resource_id}?expires=..&token=..: ダウンロード。
///
/// アクセス検証を通過した場合のみ存在確認を行うため、
/// 無効なトークンからはリソースの有無を判別できない。
pub async fn handle_download(
    State(state): State<Arc<GatewayState>>,
    Path(resource_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, GatewayError> {
    let blob = fetch_download(&state, &resource_id, &query, now_millis()?).await?;

    let content_type = HeaderValue::from_str(&blob.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = content_disposition(&blob.display_name)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_LENGTH, HeaderValue::from(blob.bytes.len())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        blob.bytes,
    )
        .into_response())
}

/// アクセス検証 → 取得。
pub(crate) async fn fetch_download(
    state: &GatewayState,
    resource_id: &str,
    query: &DownloadQuery,
    now: u64,
) -> Result<StoredBlob, GatewayError> {
    authorize_download(state, resource_id, query, now).await?;
    state
        .blob_store
        .get(resource_id)
        .await?
        .ok_or(GatewayError::NotFound)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> GatewayError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge(e.body_text())
    } else {
        GatewayError::BadRequest(format!("multipartの読み取りに失敗: {}", e.body_text()))
    }
}

/// クライアントが送ったファイル名からパス部分と前後の空白を除く。
fn sanitize_display_name(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim().to_string()
}

/// `attachment; filename="..."` を組み立てる。引用符・バックスラッシュ・制御文字は `_` に置換する。
fn content_disposition(display_name: &str) -> Result<HeaderValue, GatewayError> {
    let name = if display_name.is_empty() {
        FALLBACK_DISPLAY_NAME
    } else {
        display_name
    };
    let escaped: String = name
        .chars()
        .map(|c| {
            if c == '"' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    HeaderValue::from_bytes(format!("attachment; filename=\"{escaped}\"").as_bytes())
        .map_err(|e| GatewayError::Internal(format!("Content-Dispositionの生成に失敗: {e}")))
}
