//! # 署名用秘密鍵ストア
//!
//! アクセストークンの署名に使う唯一の秘密鍵を遅延生成し、ディスクに永続化する。
//! プロセス再起動後も同じ鍵を読み込むため、発行済みURLは有効期限まで有効であり続ける。
//!
//! ## 初回生成の排他
//! 候補鍵を一意な一時ファイルに書き込み、`hard_link` で最終パスに結びつける。
//! リンク先が既に存在する場合は失敗するため、複数プロセスが同時に初回生成しても
//! 最終パスに現れる鍵は常に1つだけになる。負けた側は勝者の鍵を読み直す。

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parcel_crypto::SigningSecret;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;

use crate::error::GatewayError;
use crate::storage::local::discard_partial;

/// 秘密鍵ファイル名
pub const SECRET_FILE_NAME: &str = "signing.key";

/// 署名用秘密鍵ストア。
///
/// 一度読み込んだ鍵はプロセス内にキャッシュされ、以降の読み出しはディスクに触れない。
pub struct SecretStore {
    dir: PathBuf,
    cached: OnceCell<SigningSecret>,
}

impl SecretStore {
    /// 鍵を格納するディレクトリを指定して構築する。ディレクトリは初回生成時に作成される。
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cached: OnceCell::new(),
        }
    }

    /// 秘密鍵ファイルのパス。
    pub fn path(&self) -> PathBuf {
        self.dir.join(SECRET_FILE_NAME)
    }

    /// 永続化された秘密鍵を返す。存在しなければ生成して永続化する。
    pub async fn get_or_create(&self) -> Result<&SigningSecret, GatewayError> {
        self.cached.get_or_try_init(|| self.load_or_create()).await
    }

    async fn load_or_create(&self) -> Result<SigningSecret, GatewayError> {
        let path = self.path();
        if let Some(secret) = read_secret(&path).await? {
            tracing::info!(path = %path.display(), "署名用秘密鍵を読み込みました");
            return Ok(secret);
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            GatewayError::Secret(format!(
                "ディレクトリの作成に失敗 ({}): {e}",
                self.dir.display()
            ))
        })?;

        let candidate = SigningSecret::generate();
        let tmp_path = self
            .dir
            .join(format!(".{SECRET_FILE_NAME}.{}.tmp", uuid::Uuid::new_v4()));
        write_secret_file(&tmp_path, &candidate).await?;

        let linked = tokio::fs::hard_link(&tmp_path, &path).await;
        if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
            tracing::warn!(path = %tmp_path.display(), error = %e, "一時ファイルの削除に失敗");
        }

        match linked {
            Ok(()) => {
                tracing::info!(path = %path.display(), "署名用秘密鍵を新規生成しました");
                Ok(candidate)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // 別の呼び出し元が先に生成した
                read_secret(&path).await?.ok_or_else(|| {
                    GatewayError::Secret(format!("秘密鍵ファイルが消失しました ({})", path.display()))
                })
            }
            Err(e) => Err(GatewayError::Secret(format!(
                "秘密鍵ファイルの作成に失敗 ({}): {e}",
                path.display()
            ))),
        }
    }
}

/// 秘密鍵ファイルを読む。存在しなければ `None`。
async fn read_secret(path: &Path) -> Result<Option<SigningSecret>, GatewayError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => SigningSecret::from_hex(&contents).map(Some).map_err(|e| {
            GatewayError::Secret(format!("秘密鍵ファイルが破損しています ({}): {e}", path.display()))
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(GatewayError::Secret(format!(
            "秘密鍵ファイルの読み込みに失敗 ({}): {e}",
            path.display()
        ))),
    }
}

async fn write_secret_file(path: &Path, secret: &SigningSecret) -> Result<(), GatewayError> {
    let io_err =
        |e: std::io::Error| GatewayError::Secret(format!("書き込みに失敗 ({}): {e}", path.display()));

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(io_err)?;
    let written = async {
        file.write_all(format!("{}\n", secret.to_hex()).as_bytes()).await?;
        file.sync_all().await
    }
    .await;
    drop(file);
    if let Err(e) = written {
        discard_partial(path).await;
        return Err(io_err(e));
    }
    Ok(())
}
