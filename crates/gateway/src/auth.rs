//! # 署名付きダウンロードURL
//!
//! アップロード時のURL発行と、ダウンロード時のアクセス検証。
//! トークンは (resource_id, expires) と署名用秘密鍵のみから導出されるため、
//! 発行済みトークンを保存する必要はなく、同じ秘密鍵を持つ任意のプロセスで検証できる。

use parcel_crypto::{sign_access_token, verify_access_token, AccessDecision, SigningSecret};
use parcel_types::DownloadQuery;

use crate::config::GatewayState;
use crate::error::GatewayError;

/// 発行したダウンロードURL。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    /// `{base}/v1/files/{id}?expires={ms}&token={token}`
    pub url: String,
    /// 有効期限（エポックミリ秒）
    pub expires_at: u64,
}

/// `now` から有効期間分の期限を持つダウンロードURLを発行する。
///
/// 秘密鍵は呼び出し元がオブジェクト保存前に取得しておく。
pub(crate) fn issue_download_link(
    state: &GatewayState,
    secret: &SigningSecret,
    resource_id: &str,
    now: u64,
) -> Result<DownloadLink, GatewayError> {
    let expires_at = now.saturating_add(state.link_ttl_secs.saturating_mul(1000));
    let token = sign_access_token(resource_id, expires_at, secret)
        .map_err(|e| GatewayError::Internal(format!("トークン生成に失敗: {e}")))?;

    let url = format!(
        "{}/v1/files/{resource_id}?expires={expires_at}&token={token}",
        state.public_base_url.trim_end_matches('/')
    );
    Ok(DownloadLink { url, expires_at })
}

/// ダウンロード要求のアクセス権を検証する。
///
/// 期限切れ・署名不一致・パラメータ欠落はすべて同じ `Forbidden` になる。
pub(crate) async fn authorize_download(
    state: &GatewayState,
    resource_id: &str,
    query: &DownloadQuery,
    now: u64,
) -> Result<(), GatewayError> {
    let (Some(expires_raw), Some(token)) = (query.expires.as_deref(), query.token.as_deref())
    else {
        tracing::debug!(resource_id, "expires / token が欠落しています");
        return Err(GatewayError::Forbidden);
    };
    let Ok(expires_at) = expires_raw.parse::<u64>() else {
        tracing::debug!(resource_id, "expires が数値ではありません");
        return Err(GatewayError::Forbidden);
    };

    let secret = state.secret_store.get_or_create().await?;
    let decision = verify_access_token(resource_id, expires_at, token, secret, now)
        .map_err(|e| GatewayError::Internal(format!("トークン検証に失敗: {e}")))?;

    match decision {
        AccessDecision::Granted => Ok(()),
        AccessDecision::Denied => {
            tracing::debug!(resource_id, expires_at, now, "ダウンロードを拒否しました");
            Err(GatewayError::Forbidden)
        }
    }
}
