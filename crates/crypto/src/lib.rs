//! # Parcel 暗号処理
//!
//! 署名付きダウンロードURLに埋め込むアクセストークンの生成・検証を実装する。
//!
//! ## 暗号アルゴリズム
//! | 用途 | アルゴリズム |
//! |------|------------|
//! | トークン署名 | HMAC-SHA256 |
//! | トークン比較 | 定数時間比較（subtle） |
//! | エンコード | Base64URL（パディングなし） |
//! | 秘密鍵生成 | OS乱数 32バイト |
//!
//! ## 署名対象
//! ```text
//! [4B: resource_id_len (BE)][resource_id][8B: expires_at (BE)]
//! ```
//! 長さプレフィックスにより `("a1", 23)` と `("a", 123)` のような曖昧さを排除する。

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// 生成する署名用秘密鍵のバイト長
pub const SECRET_LEN: usize = 32;

/// 受け入れる署名用秘密鍵の最小バイト長（128ビット）
pub const MIN_SECRET_LEN: usize = 16;

/// 暗号処理のエラー型
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// 秘密鍵が短すぎる
    #[error("署名用秘密鍵が短すぎます: {0} bytes (最小: {MIN_SECRET_LEN} bytes)")]
    SecretTooShort(usize),
    /// 秘密鍵の16進デコードに失敗
    #[error("署名用秘密鍵の16進デコードに失敗しました: {0}")]
    SecretEncoding(String),
    /// HMACの初期化に失敗
    #[error("HMACの初期化に失敗しました")]
    MacInit,
}

/// Base64エンジン（URL-safe、パディングなし）
fn b64url() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
}

// ---------------------------------------------------------------------------
// 署名用秘密鍵
// ---------------------------------------------------------------------------

/// アクセストークンの署名に使う秘密鍵。
///
/// ドロップ時にゼロ化され、`Debug` では中身を表示しない。
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    /// OS乱数から新しい秘密鍵を生成する。
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// バイト列から秘密鍵を構築する。128ビット未満は拒否する。
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_SECRET_LEN {
            return Err(CryptoError::SecretTooShort(bytes.len()));
        }
        Ok(Self(bytes))
    }

    /// 16進文字列（前後の空白は無視）から秘密鍵を復元する。
    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let bytes =
            hex::decode(encoded.trim()).map_err(|e| CryptoError::SecretEncoding(e.to_string()))?;
        Self::from_bytes(bytes)
    }

    /// 永続化用の16進文字列表現。
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningSecret(<{} bytes redacted>)", self.0.len())
    }
}

// ---------------------------------------------------------------------------
// アクセストークン
// ---------------------------------------------------------------------------

/// アクセス判定結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    Denied,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

/// 署名対象のバイト列を構築する。
fn token_message(resource_id: &str, expires_at: u64) -> Vec<u8> {
    let id = resource_id.as_bytes();
    let mut message = Vec::with_capacity(4 + id.len() + 8);
    message.extend_from_slice(&(id.len() as u32).to_be_bytes());
    message.extend_from_slice(id);
    message.extend_from_slice(&expires_at.to_be_bytes());
    message
}

/// (resource_id, expires_at) に束縛されたアクセストークンを生成する。
///
/// 同じ入力に対しては常に同じトークンを返す。
pub fn sign_access_token(
    resource_id: &str,
    expires_at: u64,
    secret: &SigningSecret,
) -> Result<String, CryptoError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| CryptoError::MacInit)?;
    mac.update(&token_message(resource_id, expires_at));
    Ok(b64url().encode(mac.finalize().into_bytes()))
}

/// アクセストークンを検証する。
///
/// `now > expires_at` の場合はダイジェストを計算せずに即座に拒否する。
/// 期限内であればトークンを再計算し、定数時間で比較する。
pub fn verify_access_token(
    resource_id: &str,
    expires_at: u64,
    token: &str,
    secret: &SigningSecret,
    now: u64,
) -> Result<AccessDecision, CryptoError> {
    if now > expires_at {
        return Ok(AccessDecision::Denied);
    }

    let expected = sign_access_token(resource_id, expires_at, secret)?;
    if constant_time_eq(expected.as_bytes(), token.as_bytes()) {
        Ok(AccessDecision::Granted)
    } else {
        Ok(AccessDecision::Denied)
    }
}

/// 定数時間のバイト列比較。長さが異なる場合は即座にfalse。
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
