//! # Parcel 共有型定義
//!
//! Gateway・Worker間、およびクライアントとのHTTP境界で使用するデータ構造を提供する。
//!
//! ## エンコーディング規則
//! - HTTPに露出する構造体はcamelCase
//! - タイムスタンプはUNIXエポックからのミリ秒（u64）
//! - アクセストークンはBase64URL（パディングなし）

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ファイルアップロード / ダウンロード
// ---------------------------------------------------------------------------

/// `POST /v1/files` のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// 生成されたリソースID（UUID v4）
    pub resource_id: String,
    /// アップロード時に指定された表示名
    pub display_name: String,
    /// 保存したバイト数
    pub size: u64,
    /// 署名付きダウンロードURL（resourceId, expires, tokenを含む）
    pub download_url: String,
    /// ダウンロードURLの有効期限（エポックミリ秒）
    pub expires_at: u64,
}

/// ダウンロードURLのクエリパラメータ。
///
/// 欠落・不正値は署名不一致と同じく拒否されるため、全フィールドをOptionで受ける。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadQuery {
    /// 有効期限（エポックミリ秒、10進文字列）
    pub expires: Option<String>,
    /// アクセストークン
    pub token: Option<String>,
}

// ---------------------------------------------------------------------------
// アイテム
// ---------------------------------------------------------------------------

/// アイテム名の最大文字数
pub const ITEM_NAME_MAX_CHARS: usize = 100;
/// アイテム説明の最大文字数
pub const ITEM_DESCRIPTION_MAX_CHARS: usize = 500;

/// 追跡対象リソース（アイテム）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// アイテムID（UUID v4）
    pub id: String,
    /// 名前
    pub name: String,
    /// 説明
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 作成日時（エポックミリ秒）
    pub created_at: u64,
    /// 最終更新日時（エポックミリ秒）
    pub updated_at: u64,
}

/// アイテムの作成・更新リクエスト。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemInput {
    /// 名前（空白のみ不可、100文字以内）
    pub name: String,
    /// 説明（500文字以内）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ItemInput {
    /// 入力値を検証する。違反内容を人間が読める文字列で返す。
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("nameは空にできません".to_string());
        }
        if self.name.chars().count() > ITEM_NAME_MAX_CHARS {
            return Err(format!(
                "nameは{ITEM_NAME_MAX_CHARS}文字以内である必要があります"
            ));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > ITEM_DESCRIPTION_MAX_CHARS {
                return Err(format!(
                    "descriptionは{ITEM_DESCRIPTION_MAX_CHARS}文字以内である必要があります"
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 変更通知イベント
// ---------------------------------------------------------------------------

/// 変更の種類。閉じた集合。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Created,
    Updated,
    Deleted,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Created => "created",
            MutationKind::Updated => "updated",
            MutationKind::Deleted => "deleted",
        }
    }
}

/// 変更対象リソースの種別。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// アップロードされたファイル
    File,
    /// アイテム
    Item,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::File => "file",
            ResourceKind::Item => "item",
        }
    }
}

/// 変更通知イベント。不変のレコードで、成功した変更1件につき1つ生成される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    /// 変更の種類
    pub kind: MutationKind,
    /// 対象リソースの種別
    pub resource: ResourceKind,
    /// 対象リソースのID
    pub resource_id: String,
    /// 対象リソースの名前（削除時は不明な場合がある）
    pub resource_name: Option<String>,
    /// 発行日時（エポックミリ秒）
    pub emitted_at: u64,
}

impl MutationEvent {
    /// イベント種別文字列（例: `item.created`）。
    pub fn event_type(&self) -> String {
        format!("{}.{}", self.resource.as_str(), self.kind.as_str())
    }

    /// 外部シンクに送信するエンベロープへ変換する。
    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_type: self.event_type(),
            data: MutationEventData {
                id: self.resource_id.clone(),
                name: self.resource_name.clone(),
                emitted_at: self.emitted_at,
            },
        }
    }
}

/// 外部シンクが受け取る `{type, data}` 形式のエンベロープ。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// イベント種別（例: `file.created`）
    #[serde(rename = "type")]
    pub event_type: String,
    /// イベント本体
    pub data: MutationEventData,
}

/// エンベロープの `data` 部分。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MutationEventData {
    /// 対象リソースのID
    pub id: String,
    /// 対象リソースの名前
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 発行日時（エポックミリ秒）
    pub emitted_at: u64,
}

// ---------------------------------------------------------------------------
// 検証パイプライン
// ---------------------------------------------------------------------------

/// Gatewayが発行する検証サンプルのスキーマバージョン
pub const SAMPLE_SCHEMA_VERSION: &str = "1";

/// 検証パイプラインを流れるサンプルメッセージ。
///
/// Workerは受信時に各フィールドの型と `timestamp`（RFC 3339）を検証し、
/// 通過したものだけを保存する。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSample {
    /// サンプルID（UUID v4）
    pub id: String,
    /// 生成日時（RFC 3339）
    pub timestamp: String,
    /// スキーマバージョン
    pub schema_version: String,
    /// 任意のJSON本体
    pub payload: serde_json::Value,
}

/// プッシュ配信の外側の封筒。`message.data` はサンプルJSONのBase64（標準、パディングあり）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushEnvelope {
    pub message: PushMessage,
}

/// プッシュ配信メッセージ。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushMessage {
    pub data: String,
}

/// `POST /v1/validate/sample` のレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleQueued {
    /// 常に `"queued"`
    pub status: String,
    /// 発行したサンプルのID
    pub id: String,
}

// ---------------------------------------------------------------------------
// 時刻
// ---------------------------------------------------------------------------

/// 現在時刻（UNIXエポックからのミリ秒）。システム時刻がエポックより前なら `None`。
pub fn now_millis() -> Option<u64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(elapsed.as_millis()).ok()
}

// ---------------------------------------------------------------------------
// ヘルスチェック・Worker応答
// ---------------------------------------------------------------------------

/// `{"status": ...}` 形式の簡易ステータス応答。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format() {
        let event = MutationEvent {
            kind: MutationKind::Created,
            resource: ResourceKind::Item,
            resource_id: "abc".to_string(),
            resource_name: Some("widget".to_string()),
            emitted_at: 1_700_000_000_000,
        };

        let value = serde_json::to_value(event.to_envelope()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "item.created",
                "data": {"id": "abc", "name": "widget", "emittedAt": 1_700_000_000_000u64}
            })
        );
    }

    #[test]
    fn test_deleted_event_omits_unknown_name() {
        let event = MutationEvent {
            kind: MutationKind::Deleted,
            resource: ResourceKind::Item,
            resource_id: "abc".to_string(),
            resource_name: None,
            emitted_at: 1,
        };

        let value = serde_json::to_value(event.to_envelope()).unwrap();
        assert_eq!(value["type"], "item.deleted");
        assert!(value["data"].get("name").is_none());
    }

    #[test]
    fn test_upload_response_is_camel_case() {
        let response = UploadResponse {
            resource_id: "id".to_string(),
            display_name: "report.pdf".to_string(),
            size: 10,
            download_url: "http://localhost/v1/files/id?expires=1&token=t".to_string(),
            expires_at: 1,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert!(value.get("resourceId").is_some());
        assert!(value.get("displayName").is_some());
        assert!(value.get("downloadUrl").is_some());
    }

    #[test]
    fn test_item_input_validation() {
        let ok = ItemInput {
            name: "widget".to_string(),
            description: None,
        };
        assert!(ok.validate().is_ok());

        let blank = ItemInput {
            name: "   ".to_string(),
            description: None,
        };
        assert!(blank.validate().is_err());

        let long_name = ItemInput {
            name: "a".repeat(ITEM_NAME_MAX_CHARS + 1),
            description: None,
        };
        assert!(long_name.validate().is_err());

        let long_description = ItemInput {
            name: "widget".to_string(),
            description: Some("d".repeat(ITEM_DESCRIPTION_MAX_CHARS + 1)),
        };
        assert!(long_description.validate().is_err());
    }

    #[test]
    fn test_validation_sample_wire_format() {
        let sample = ValidationSample {
            id: "abc".to_string(),
            timestamp: "2026-01-01T00:00:00.000Z".to_string(),
            schema_version: SAMPLE_SCHEMA_VERSION.to_string(),
            payload: serde_json::json!({"message": "hello-world"}),
        };
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["schemaVersion"], "1");
        assert_eq!(value["payload"]["message"], "hello-world");
        assert!(value.get("schema_version").is_none());
    }

    #[test]
    fn test_now_millis_is_after_2020() {
        assert!(now_millis().unwrap() > 1_577_836_800_000);
    }
}
