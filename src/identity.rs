// どこで: simpleswap クライアントの署名鍵管理
// 何を: 環境変数または鍵ファイルの hex 秘密鍵から LocalWallet を構築する
// なぜ: 署名方法を一箇所に集約し再利用性を高めるため

use ethers::signers::LocalWallet;
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("鍵ファイル読み込みに失敗しました: {0}")]
    ReadFailed(String),
    #[error("秘密鍵から wallet を生成できませんでした: {0}")]
    BuildFailed(String),
}

pub fn load_wallet(key_env: &str, key_path: &Path) -> Result<LocalWallet, IdentityError> {
    // 環境変数に鍵があればファイルより優先する
    if let Some(key) = env::var(key_env).ok().filter(|v| !v.trim().is_empty()) {
        return parse_wallet(&key);
    }

    if key_path.as_os_str().is_empty() {
        return Err(IdentityError::ReadFailed(format!(
            "{} も鍵ファイルも指定されていません",
            key_env
        )));
    }

    let key_str = fs::read_to_string(key_path)
        .map_err(|e| IdentityError::ReadFailed(format!("{}: {}", key_path.display(), e)))?;
    parse_wallet(&key_str)
}

pub fn parse_wallet(raw: &str) -> Result<LocalWallet, IdentityError> {
    let key = raw.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    key.parse::<LocalWallet>()
        .map_err(|e| IdentityError::BuildFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::Signer;

    // anvil の既定アカウント #0
    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ANVIL_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    #[test]
    fn parses_prefixed_and_bare_keys() {
        let with_prefix = parse_wallet(ANVIL_KEY).unwrap();
        let bare = parse_wallet(ANVIL_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(with_prefix.address(), bare.address());
        assert_eq!(
            with_prefix.address(),
            ANVIL_ADDRESS.parse::<ethers::types::Address>().unwrap()
        );
    }

    #[test]
    fn rejects_garbage_key() {
        assert!(matches!(
            parse_wallet("not a key"),
            Err(IdentityError::BuildFailed(_))
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = load_wallet(
            "SIMPLESWAP_TEST_UNSET_KEY",
            Path::new("/nonexistent/simpleswap.key"),
        );
        assert!(matches!(result, Err(IdentityError::ReadFailed(_))));
    }
}
