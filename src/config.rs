// どこで: simpleswap クライアントの設定モジュール
// 何を: RPC エンドポイント・鍵パス・コントラクトアドレス・ワークフロー設定を集中管理
// なぜ: マジックナンバーを避け、環境変更を安全に行うため

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("アドレスの形式が不正です ({field}): {value}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("金額設定が不正です ({field}): {reason}")]
    InvalidAmount { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// 確認とみなすブロック数
    pub confirmations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub key_path: String,
    /// hex 秘密鍵を入れる環境変数名（ファイルより優先）
    pub key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    pub venue: String,
    pub token_a: String,
    pub token_b: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    pub venue: Address,
    pub token_a: Address,
    pub token_b: Address,
}

impl ContractsConfig {
    pub fn addresses(&self) -> Result<ContractAddresses, ConfigError> {
        Ok(ContractAddresses {
            venue: parse_address("venue", &self.venue)?,
            token_a: parse_address("token_a", &self.token_a)?,
            token_b: parse_address("token_b", &self.token_b)?,
        })
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    value
        .trim()
        .parse::<Address>()
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// 送信時刻に足すオンチェーン期限 (秒)
    pub deadline_secs: u64,
    /// mint で発行する量（10 進文字列）
    pub mint_amount: String,
    /// 同種ワークフローの多重起動を拒否するか
    pub serialize_per_kind: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordWebhookConfig {
    /// .env に定義するキー名（例: DISCORD_WEBHOOK_URL）
    pub env_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub identity: IdentityConfig,
    pub contracts: ContractsConfig,
    pub workflow: WorkflowConfig,
    pub discord: DiscordWebhookConfig,
}

pub const DEFAULT_VENUE: &str = "0xe30Ad4daFB933547Fe3e68ea4e3dB8416CDEEf82";
pub const DEFAULT_TOKEN_A: &str = "0xf367150C56b9c8C14db60914C82D1b278cfA7A6D";
pub const DEFAULT_TOKEN_B: &str = "0x1Fd59a58510686a2d6029A8D27F66Fdc68360ed1";

impl AppConfig {
    pub fn load_default() -> Self {
        // 環境変数を使って上書きできるようにする（指定がなければデフォルト）
        let rpc_url = env_string("SIMPLESWAP_RPC_URL", "http://127.0.0.1:8545");
        let confirmations = env_parsed("SIMPLESWAP_CONFIRMATIONS", 1usize);
        let key_path = env_string("SIMPLESWAP_KEY_PATH", "wallet.key");
        let deadline_secs = env_parsed("SIMPLESWAP_DEADLINE_SECS", 300u64);
        let mint_amount = env_string("SIMPLESWAP_MINT_AMOUNT", "100");
        let serialize_per_kind = env_parsed("SIMPLESWAP_SERIALIZE_WORKFLOWS", true);
        let discord_env_key = env_string("DISCORD_WEBHOOK_ENV_KEY", "DISCORD_WEBHOOK_URL");

        AppConfig {
            network: NetworkConfig {
                rpc_url,
                confirmations,
            },
            identity: IdentityConfig {
                key_path,
                key_env: "SIMPLESWAP_PRIVATE_KEY".to_string(),
            },
            contracts: ContractsConfig {
                venue: env_string("SIMPLESWAP_VENUE", DEFAULT_VENUE),
                token_a: env_string("SIMPLESWAP_TOKEN_A", DEFAULT_TOKEN_A),
                token_b: env_string("SIMPLESWAP_TOKEN_B", DEFAULT_TOKEN_B),
            },
            workflow: WorkflowConfig {
                deadline_secs,
                mint_amount,
                serialize_per_kind,
            },
            discord: DiscordWebhookConfig {
                env_key: discord_env_key,
            },
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
