//! # /v1/items
//!
//! アイテムのCRUD。書き込み成功後に変更通知を発行する。

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use parcel_types::{Item, ItemInput, MutationKind, ResourceKind};

use crate::config::GatewayState;
use crate::error::GatewayError;

/// GET /v1/items: 全件取得（作成順）。
pub async fn handle_list_items(
    State(state): State<Arc<GatewayState>>,
) -> Result<Json<Vec<Item>>, GatewayError> {
    Ok(Json(state.items.list().await?))
}

/// GET /v1/items/{id}
pub async fn handle_get_item(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<Json<Item>, GatewayError> {
    state
        .items
        .get(&id)
        .await?
        .map(Json)
        .ok_or(GatewayError::NotFound)
}

/// POST /v1/items: 作成。201とLocationヘッダーを返す。
pub async fn handle_create_item(
    State(state): State<Arc<GatewayState>>,
    Json(body): Json<ItemInput>,
) -> Result<impl IntoResponse, GatewayError> {
    body.validate().map_err(GatewayError::BadRequest)?;

    let created = state.items.create(body).await?;
    state.notifier.emit_mutation(
        MutationKind::Created,
        ResourceKind::Item,
        &created.id,
        Some(&created.name),
    );

    let location = format!("/v1/items/{}", created.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(created),
    ))
}

/// PUT /v1/items/{id}: 名前・説明の置き換え。
pub async fn handle_update_item(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    Json(body): Json<ItemInput>,
) -> Result<Json<Item>, GatewayError> {
    body.validate().map_err(GatewayError::BadRequest)?;

    let updated = state
        .items
        .update(&id, body)
        .await?
        .ok_or(GatewayError::NotFound)?;
    state.notifier.emit_mutation(
        MutationKind::Updated,
        ResourceKind::Item,
        &updated.id,
        Some(&updated.name),
    );
    Ok(Json(updated))
}

/// DELETE /v1/items/{id}: 削除。実際に削除した場合のみ通知する。
pub async fn handle_delete_item(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    let removed = state
        .items
        .delete(&id)
        .await?
        .ok_or(GatewayError::NotFound)?;
    state.notifier.emit_mutation(
        MutationKind::Deleted,
        ResourceKind::Item,
        &removed.id,
        Some(&removed.name),
    );
    Ok(StatusCode::NO_CONTENT)
}
