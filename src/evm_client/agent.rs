// どこで: EVM への低レベル呼び出しをまとめる Provider ラッパ
// 何を: Provider 初期化、署名付き送信・確認待ち・参照のエラーハンドリング一元化
// なぜ: ethers の差分を吸収し、上位を安定させるため

use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::contract::{ContractCall, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider, ProviderError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TxHash, U256, U64};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::bindings::{SimpleSwap, TestToken};
use super::gateway::{
    AddLiquidityParams, DexGateway, RemoteError, RemoveLiquidityParams, SwapParams, WalletProvider,
};
use crate::config::{AppConfig, ConfigError};
use crate::identity::load_wallet;

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// 鍵ファイル（または環境変数）と RPC URL からゲートウェイを作る wallet
pub struct EvmWalletProvider {
    rpc_url: String,
    key_env: String,
    key_path: PathBuf,
    venue: Address,
    confirmations: usize,
}

impl EvmWalletProvider {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let addresses = cfg.contracts.addresses()?;
        Ok(EvmWalletProvider {
            rpc_url: cfg.network.rpc_url.clone(),
            key_env: cfg.identity.key_env.clone(),
            key_path: PathBuf::from(&cfg.identity.key_path),
            venue: addresses.venue,
            confirmations: cfg.network.confirmations,
        })
    }
}

#[async_trait]
impl WalletProvider for EvmWalletProvider {
    async fn request_account(&self) -> Result<Arc<dyn DexGateway>, RemoteError> {
        let wallet = load_wallet(&self.key_env, &self.key_path)
            .map_err(|e| RemoteError::Unavailable(e.to_string()))?;
        let gateway =
            EvmGateway::connect(&self.rpc_url, wallet, self.venue, self.confirmations).await?;
        Ok(Arc::new(gateway))
    }
}

#[derive(Clone)]
pub struct EvmGateway {
    client: Arc<SignerClient>,
    venue: Address,
    confirmations: usize,
}

impl EvmGateway {
    pub async fn connect(
        url: &str,
        wallet: LocalWallet,
        venue: Address,
        confirmations: usize,
    ) -> Result<Self, RemoteError> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| RemoteError::Unavailable(format!("{}: {}", url, e)))?;
        let chain_id = provider.get_chainid().await.map_err(provider_error)?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());
        info!(
            "接続しました: chain_id={} address={:?}",
            chain_id,
            wallet.address()
        );
        Ok(EvmGateway {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            venue,
            confirmations: confirmations.max(1),
        })
    }

    fn venue_contract(&self) -> SimpleSwap<SignerClient> {
        SimpleSwap::new(self.venue, self.client.clone())
    }

    fn token_contract(&self, token: Address) -> TestToken<SignerClient> {
        TestToken::new(token, self.client.clone())
    }
}

#[async_trait]
impl DexGateway for EvmGateway {
    fn caller(&self) -> Address {
        self.client.address()
    }

    fn venue(&self) -> Address {
        self.venue
    }

    async fn get_price(&self, token_a: Address, token_b: Address) -> Result<U256, RemoteError> {
        self.venue_contract()
            .get_price(token_a, token_b)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn liquidity_balance(&self, owner: Address) -> Result<U256, RemoteError> {
        self.venue_contract()
            .balance_of(owner)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, RemoteError> {
        self.token_contract(token)
            .balance_of(owner)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, RemoteError> {
        submit(self.token_contract(token).approve(spender, amount)).await
    }

    async fn swap_exact_tokens_for_tokens(&self, params: SwapParams) -> Result<TxHash, RemoteError> {
        let call = self.venue_contract().swap_exact_tokens_for_tokens(
            params.amount_in,
            params.amount_out_min,
            params.path,
            params.to,
            params.deadline,
        );
        submit(call).await
    }

    async fn add_liquidity(&self, params: AddLiquidityParams) -> Result<TxHash, RemoteError> {
        let call = self.venue_contract().add_liquidity(
            params.token_a,
            params.token_b,
            params.amount_a_desired,
            params.amount_b_desired,
            params.amount_a_min,
            params.amount_b_min,
            params.to,
            params.deadline,
        );
        submit(call).await
    }

    async fn remove_liquidity(
        &self,
        params: RemoveLiquidityParams,
    ) -> Result<TxHash, RemoteError> {
        let call = self.venue_contract().remove_liquidity(
            params.token_a,
            params.token_b,
            params.liquidity,
            params.amount_a_min,
            params.amount_b_min,
            params.to,
            params.deadline,
        );
        submit(call).await
    }

    async fn mint(&self, token: Address, to: Address, amount: U256) -> Result<TxHash, RemoteError> {
        submit(self.token_contract(token).mint(to, amount)).await
    }

    async fn confirm(&self, tx: TxHash) -> Result<(), RemoteError> {
        let receipt = PendingTransaction::new(tx, self.client.provider())
            .confirmations(self.confirmations)
            .await
            .map_err(provider_error)?;
        match receipt {
            // status 0 は revert
            Some(r) if r.status == Some(U64::zero()) => Err(RemoteError::Reverted { tx }),
            Some(r) => {
                debug!("確認済み: {:?} block={:?}", tx, r.block_number);
                Ok(())
            }
            None => Err(RemoteError::Dropped { tx }),
        }
    }
}

async fn submit<D>(call: ContractCall<SignerClient, D>) -> Result<TxHash, RemoteError>
where
    D: Detokenize + Send + Sync,
{
    let pending = call.send().await.map_err(contract_error)?;
    let hash = pending.tx_hash();
    Ok(hash)
}

fn contract_error(err: ContractError<SignerClient>) -> RemoteError {
    // revert 理由が取れればそれを優先する
    match err.decode_revert::<String>() {
        Some(reason) => RemoteError::Rejected { reason },
        None => RemoteError::Provider(err.to_string()),
    }
}

fn provider_error(err: ProviderError) -> RemoteError {
    RemoteError::Provider(err.to_string())
}
