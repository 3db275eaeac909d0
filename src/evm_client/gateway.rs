// どこで: リモート能力（トークン・venue）の抽象境界
// 何を: 送信・確認・参照の各呼び出しを trait として定義する
// なぜ: コントローラを RPC 実装から切り離し、モックで検証できるようにするため

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("RPC エラー: {0}")]
    Provider(String),
    #[error("{reason}")]
    Rejected { reason: String },
    #[error("トランザクションが revert しました: {tx:?}")]
    Reverted { tx: TxHash },
    #[error("トランザクションが破棄されました: {tx:?}")]
    Dropped { tx: TxHash },
    #[error("wallet を利用できません: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// リモートが返した理由文字列（あれば）
    pub fn reason(&self) -> Option<&str> {
        match self {
            RemoteError::Rejected { reason } => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub to: Address,
    pub deadline: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddLiquidityParams {
    pub token_a: Address,
    pub token_b: Address,
    pub amount_a_desired: U256,
    pub amount_b_desired: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub to: Address,
    pub deadline: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveLiquidityParams {
    pub token_a: Address,
    pub token_b: Address,
    pub liquidity: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub to: Address,
    pub deadline: U256,
}

/// 署名済み identity に束縛されたリモート呼び出し口。
///
/// 書き込み系は送信だけを行いハッシュを返す。確認待ちは [`DexGateway::confirm`]
/// で別に行うので、承認 2 本を送ってからまとめて待つ、といった順序を呼び出し側が決められる。
#[async_trait]
pub trait DexGateway: Send + Sync {
    /// 呼び出し元アドレス
    fn caller(&self) -> Address;

    /// venue のアドレス（LP トークンのアドレスでもある）
    fn venue(&self) -> Address;

    async fn get_price(&self, token_a: Address, token_b: Address) -> Result<U256, RemoteError>;

    /// venue が発行する LP シェアの残高
    async fn liquidity_balance(&self, owner: Address) -> Result<U256, RemoteError>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, RemoteError>;

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, RemoteError>;

    async fn swap_exact_tokens_for_tokens(&self, params: SwapParams) -> Result<TxHash, RemoteError>;

    async fn add_liquidity(&self, params: AddLiquidityParams) -> Result<TxHash, RemoteError>;

    async fn remove_liquidity(&self, params: RemoveLiquidityParams)
        -> Result<TxHash, RemoteError>;

    async fn mint(&self, token: Address, to: Address, amount: U256) -> Result<TxHash, RemoteError>;

    /// 送信済みトランザクションの確認を待つ
    async fn confirm(&self, tx: TxHash) -> Result<(), RemoteError>;
}

/// アカウントへのアクセスを要求し、署名可能なゲートウェイを返す
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_account(&self) -> Result<Arc<dyn DexGateway>, RemoteError>;
}
