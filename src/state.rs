// どこで: コントローラが保持するアプリケーション状態
// 何を: セッション・トークンペア・ワークフローの段階・表示内容を一つの構造体にまとめる
// なぜ: グローバル変数を使わず、状態の書き換えをコントローラ経由に限定するため

use ethers::types::Address;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::evm_client::gateway::DexGateway;
use crate::units::shorten_address;

/// 価格・残高が取得できないときの表示
pub const UNAVAILABLE: &str = "-";

/// 接続済み identity と、それに束縛された送信口
#[derive(Clone)]
pub struct Session {
    pub address: Address,
    pub gateway: Arc<dyn DexGateway>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// 順序付きのトークンペア。価格照会とスワップ経路の向きを決める
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPair {
    pub token_a: Address,
    pub token_b: Address,
}

impl TokenPair {
    pub fn new(token_a: Address, token_b: Address) -> Self {
        TokenPair { token_a, token_b }
    }

    pub fn reverse(&mut self) {
        std::mem::swap(&mut self.token_a, &mut self.token_b);
    }

    /// A → B のスワップ経路
    pub fn path(&self) -> Vec<Address> {
        vec![self.token_a, self.token_b]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorkflowKind {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    Mint,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 4] = [
        WorkflowKind::Swap,
        WorkflowKind::AddLiquidity,
        WorkflowKind::RemoveLiquidity,
        WorkflowKind::Mint,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            WorkflowKind::Swap => "swap",
            WorkflowKind::AddLiquidity => "add-liquidity",
            WorkflowKind::RemoveLiquidity => "remove-liquidity",
            WorkflowKind::Mint => "mint",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// ワークフロー 1 本の進行段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Validating,
    AwaitingApproval,
    AwaitingExecution,
    Refreshing,
    Failed,
}

/// mint 対象のテストトークン（現在のペア順とは無関係）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintTarget {
    A,
    B,
}

impl fmt::Display for MintTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MintTarget::A => f.write_str("A"),
            MintTarget::B => f.write_str("B"),
        }
    }
}

/// 画面に出す内容のスナップショット
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    pub wallet: Option<String>,
    pub price: String,
    pub liquidity: String,
    pub token_a_label: String,
    pub token_b_label: String,
    pub statuses: BTreeMap<WorkflowKind, String>,
}

impl DisplayState {
    pub fn new(pair: &TokenPair) -> Self {
        DisplayState {
            wallet: None,
            price: UNAVAILABLE.to_string(),
            liquidity: UNAVAILABLE.to_string(),
            token_a_label: shorten_address(&pair.token_a),
            token_b_label: shorten_address(&pair.token_b),
            statuses: BTreeMap::new(),
        }
    }

    pub fn set_unavailable(&mut self) {
        self.price = UNAVAILABLE.to_string();
        self.liquidity = UNAVAILABLE.to_string();
    }

    pub fn status(&self, kind: WorkflowKind) -> Option<&str> {
        self.statuses.get(&kind).map(String::as_str)
    }
}

/// プロセス内で 1 つだけ持つ状態
#[derive(Debug)]
pub struct AppState {
    pub session: Option<Session>,
    pub pair: TokenPair,
    pub display: DisplayState,
    pub phases: BTreeMap<WorkflowKind, Phase>,
}

impl AppState {
    pub fn new(pair: TokenPair) -> Self {
        AppState {
            session: None,
            display: DisplayState::new(&pair),
            pair,
            phases: BTreeMap::new(),
        }
    }

    pub fn phase(&self, kind: WorkflowKind) -> Phase {
        self.phases.get(&kind).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TokenPair {
        TokenPair::new(Address::from_low_u64_be(0xa), Address::from_low_u64_be(0xb))
    }

    #[test]
    fn reverse_twice_restores_order() {
        let original = pair();
        let mut p = original;
        p.reverse();
        assert_eq!(p.token_a, original.token_b);
        assert_eq!(p.token_b, original.token_a);
        p.reverse();
        assert_eq!(p, original);
    }

    #[test]
    fn path_follows_current_order() {
        let mut p = pair();
        assert_eq!(p.path(), vec![p.token_a, p.token_b]);
        p.reverse();
        assert_eq!(p.path()[0], Address::from_low_u64_be(0xb));
    }

    #[test]
    fn fresh_state_is_idle_and_unavailable() {
        let state = AppState::new(pair());
        assert!(state.session.is_none());
        assert_eq!(state.display.price, UNAVAILABLE);
        assert_eq!(state.display.liquidity, UNAVAILABLE);
        for kind in WorkflowKind::ALL {
            assert_eq!(state.phase(kind), Phase::Idle);
        }
    }
}
