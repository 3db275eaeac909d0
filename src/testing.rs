// どこで: テスト用のリモート能力モック
// 何を: 送信・確認・参照の呼び出しを順番に記録し、指定した呼び出しを失敗させる
// なぜ: RPC ノードなしでワークフローの手順を検証するため

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Semaphore;

use crate::evm_client::gateway::{
    AddLiquidityParams, DexGateway, RemoteError, RemoveLiquidityParams, SwapParams, WalletProvider,
};
use crate::state::{Phase, WorkflowKind};
use crate::workflow::StatusSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
    Swap(SwapParams),
    AddLiquidity(AddLiquidityParams),
    RemoveLiquidity(RemoveLiquidityParams),
    Mint {
        token: Address,
        to: Address,
        amount: U256,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Price(Address, Address),
    Liquidity(Address),
    TokenBalance(Address, Address),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Submitted { tx: TxHash, call: Submission },
    SubmitRejected(Submission),
    Confirmed(TxHash),
    ConfirmFailed(TxHash),
    Query(Query),
}

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    attempts: usize,
    fail_submit: HashMap<usize, RemoteError>,
    fail_confirm: HashMap<usize, RemoteError>,
    fail_reads: Option<RemoteError>,
    price: U256,
    liquidity: U256,
    balances: HashMap<Address, U256>,
}

/// 記録型のモックゲートウェイ。
///
/// 送信の試行には 0 から番号が振られ、成功した送信には `番号 + 1` を
/// 下位ビットに持つハッシュが返る。失敗指定もこの番号で行う。
#[derive(Clone)]
pub struct MockGateway {
    caller: Address,
    venue: Address,
    inner: Arc<Mutex<Inner>>,
    gate: Option<Arc<Semaphore>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        MockGateway {
            caller: Address::from_low_u64_be(0xca11),
            venue: Address::from_low_u64_be(0x5a9),
            inner: Arc::new(Mutex::new(Inner::default())),
            gate: None,
        }
    }

    pub fn with_addresses(caller: Address, venue: Address) -> Self {
        MockGateway {
            caller,
            venue,
            ..Self::new()
        }
    }

    /// 確認待ちを `release` されるまで止める
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self, confirmations: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(confirmations);
        }
    }

    pub fn set_price(&self, price: U256) {
        self.lock().price = price;
    }

    pub fn set_liquidity(&self, liquidity: U256) {
        self.lock().liquidity = liquidity;
    }

    pub fn set_balance(&self, token: Address, amount: U256) {
        self.lock().balances.insert(token, amount);
    }

    pub fn fail_submission(&self, attempt: usize, error: RemoteError) {
        self.lock().fail_submit.insert(attempt, error);
    }

    pub fn fail_confirmation(&self, attempt: usize, error: RemoteError) {
        self.lock().fail_confirm.insert(attempt, error);
    }

    pub fn fail_reads(&self, error: Option<RemoteError>) {
        self.lock().fail_reads = error;
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// 成功した送信だけを順番に返す
    pub fn submissions(&self) -> Vec<Submission> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Submitted { call, .. } => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn confirmed(&self) -> Vec<TxHash> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Confirmed(tx) => Some(*tx),
                _ => None,
            })
            .collect()
    }

    pub fn queries(&self) -> Vec<Query> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Query(q) => Some(q.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn submit(&self, call: Submission) -> Result<TxHash, RemoteError> {
        let mut inner = self.lock();
        let attempt = inner.attempts;
        inner.attempts += 1;
        if let Some(err) = inner.fail_submit.remove(&attempt) {
            inner.events.push(Event::SubmitRejected(call));
            return Err(err);
        }
        let tx = TxHash::from_low_u64_be(attempt as u64 + 1);
        inner.events.push(Event::Submitted { tx, call });
        Ok(tx)
    }

    fn read(&self, query: Query) -> Result<MutexGuard<'_, Inner>, RemoteError> {
        let mut inner = self.lock();
        inner.events.push(Event::Query(query));
        if let Some(err) = inner.fail_reads.clone() {
            return Err(err);
        }
        Ok(inner)
    }
}

#[async_trait]
impl DexGateway for MockGateway {
    fn caller(&self) -> Address {
        self.caller
    }

    fn venue(&self) -> Address {
        self.venue
    }

    async fn get_price(&self, token_a: Address, token_b: Address) -> Result<U256, RemoteError> {
        Ok(self.read(Query::Price(token_a, token_b))?.price)
    }

    async fn liquidity_balance(&self, owner: Address) -> Result<U256, RemoteError> {
        Ok(self.read(Query::Liquidity(owner))?.liquidity)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, RemoteError> {
        let inner = self.read(Query::TokenBalance(token, owner))?;
        Ok(inner.balances.get(&token).copied().unwrap_or_default())
    }

    async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, RemoteError> {
        self.submit(Submission::Approve {
            token,
            spender,
            amount,
        })
    }

    async fn swap_exact_tokens_for_tokens(&self, params: SwapParams) -> Result<TxHash, RemoteError> {
        self.submit(Submission::Swap(params))
    }

    async fn add_liquidity(&self, params: AddLiquidityParams) -> Result<TxHash, RemoteError> {
        self.submit(Submission::AddLiquidity(params))
    }

    async fn remove_liquidity(
        &self,
        params: RemoveLiquidityParams,
    ) -> Result<TxHash, RemoteError> {
        self.submit(Submission::RemoveLiquidity(params))
    }

    async fn mint(&self, token: Address, to: Address, amount: U256) -> Result<TxHash, RemoteError> {
        self.submit(Submission::Mint { token, to, amount })
    }

    async fn confirm(&self, tx: TxHash) -> Result<(), RemoteError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        let attempt = tx.to_low_u64_be().saturating_sub(1) as usize;
        let mut inner = self.lock();
        if let Some(err) = inner.fail_confirm.remove(&attempt) {
            inner.events.push(Event::ConfirmFailed(tx));
            return Err(err);
        }
        inner.events.push(Event::Confirmed(tx));
        Ok(())
    }
}

/// `request_account` のたびに同じモックを返す wallet
#[derive(Clone)]
pub struct MockWallet {
    gateway: MockGateway,
    reject: Option<RemoteError>,
}

impl MockWallet {
    pub fn new(gateway: MockGateway) -> Self {
        MockWallet {
            gateway,
            reject: None,
        }
    }

    pub fn rejecting(gateway: MockGateway, error: RemoteError) -> Self {
        MockWallet {
            gateway,
            reject: Some(error),
        }
    }

    pub fn gateway(&self) -> &MockGateway {
        &self.gateway
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request_account(&self) -> Result<Arc<dyn DexGateway>, RemoteError> {
        match &self.reject {
            Some(err) => Err(err.clone()),
            None => Ok(Arc::new(self.gateway.clone())),
        }
    }
}

/// 受け取った進捗表示を記録する
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<(WorkflowKind, Phase, String)>>,
}

impl RecordingSink {
    pub fn texts(&self) -> Vec<String> {
        self.updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, _, text)| text.clone())
            .collect()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(_, phase, _)| *phase)
            .collect()
    }
}

#[async_trait]
impl StatusSink for RecordingSink {
    async fn update(&self, kind: WorkflowKind, phase: Phase, text: String) {
        self.updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((kind, phase, text));
    }
}
