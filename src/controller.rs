// どこで: トランザクションワークフローの中心ロジック
// 何を: 接続、表示更新、スワップ・流動性追加/削除・mint の実行、ペア反転
// なぜ: 上位(UI)から見たときにコマンド単位で扱えるようにするため

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::command::Command;
use crate::config::{AppConfig, ConfigError};
use crate::evm_client::gateway::{DexGateway, RemoteError, WalletProvider};
use crate::notify::{outcome_message, DiscordNotifier};
use crate::state::{AppState, DisplayState, MintTarget, Phase, Session, TokenPair, WorkflowKind};
use crate::units::{format_amount, parse_amount, shorten_address, UnitsError};
use crate::workflow::{execute, Plan, StatusSink};

pub const CONNECT_FIRST: &str = "Connect your wallet first.";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("wallet が未接続です")]
    NotConnected,
    #[error("wallet 接続に失敗しました: {0}")]
    Connect(RemoteError),
    #[error("{message} ({source})")]
    InvalidAmount {
        message: &'static str,
        source: UnitsError,
    },
    #[error("{0} は実行中です")]
    Busy(WorkflowKind),
    #[error("{kind}: ステップ {index} で失敗しました: {source}")]
    Step {
        kind: WorkflowKind,
        index: usize,
        source: RemoteError,
    },
}

impl WorkflowError {
    /// 利用者に見せる文言
    pub fn prompt(&self) -> String {
        match self {
            WorkflowError::NotConnected => CONNECT_FIRST.to_string(),
            WorkflowError::Connect(e) => format!("Error connecting wallet: {}", e),
            WorkflowError::InvalidAmount { message, .. } => message.to_string(),
            WorkflowError::Busy(kind) => format!("⏳ {} already in progress", kind),
            WorkflowError::Step { source, .. } => failure_status(source),
        }
    }
}

fn failure_status(err: &RemoteError) -> String {
    match err.reason() {
        Some(reason) => format!("❌ Error: {}", reason),
        None => format!("❌ Error: {}", err),
    }
}

/// 起動時に決まる値
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// 既定ペア。mint の対象もこの 2 つに固定
    pub default_pair: TokenPair,
    pub deadline_secs: u64,
    pub mint_amount: U256,
    pub mint_label: String,
    pub serialize_per_kind: bool,
}

impl ControllerSettings {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, ConfigError> {
        let addresses = cfg.contracts.addresses()?;
        let mint_amount =
            parse_amount(&cfg.workflow.mint_amount).map_err(|e| ConfigError::InvalidAmount {
                field: "mint_amount",
                reason: e.to_string(),
            })?;
        Ok(ControllerSettings {
            default_pair: TokenPair::new(addresses.token_a, addresses.token_b),
            deadline_secs: cfg.workflow.deadline_secs,
            mint_amount,
            mint_label: cfg.workflow.mint_amount.trim().to_string(),
            serialize_per_kind: cfg.workflow.serialize_per_kind,
        })
    }

    fn mint_token(&self, which: MintTarget) -> Address {
        match which {
            MintTarget::A => self.default_pair.token_a,
            MintTarget::B => self.default_pair.token_b,
        }
    }
}

struct Inner {
    wallet: Arc<dyn WalletProvider>,
    settings: ControllerSettings,
    state: RwLock<AppState>,
    /// 種類ごとの実行中件数。Drop から触るので std の Mutex
    in_flight: Mutex<BTreeMap<WorkflowKind, usize>>,
    notifier: Option<DiscordNotifier>,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, BTreeMap<WorkflowKind, usize>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 実行中スロット。完了・panic・タスク中断のどれでも Drop で解放する
struct InFlightSlot {
    inner: Arc<Inner>,
    kind: WorkflowKind,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        let kind = self.kind;
        let idle = {
            let mut counts = self.inner.in_flight();
            let count = counts.entry(kind).or_insert(0);
            *count = count.saturating_sub(1);
            *count == 0
        };
        if !idle {
            return;
        }
        match self.inner.state.try_write() {
            Ok(mut state) => {
                state.phases.insert(kind, Phase::Idle);
            }
            Err(_) => {
                // 書き込み中なら後で戻す
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    let inner = self.inner.clone();
                    handle.spawn(async move {
                        let mut state = inner.state.write().await;
                        if inner.in_flight().get(&kind).copied().unwrap_or(0) == 0 {
                            state.phases.insert(kind, Phase::Idle);
                        }
                    });
                }
            }
        }
    }
}

/// 操作ごとの承認・実行手順を組み立てて流すコントローラ。
///
/// 状態は内部の `AppState` 1 つだけで、書き換えはこの型のメソッド経由に限る。
/// ロックはリモート呼び出しをまたいで保持しない。
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(
        wallet: Arc<dyn WalletProvider>,
        settings: ControllerSettings,
        notifier: Option<DiscordNotifier>,
    ) -> Self {
        let state = AppState::new(settings.default_pair);
        Controller {
            inner: Arc::new(Inner {
                wallet,
                settings,
                state: RwLock::new(state),
                in_flight: Mutex::new(BTreeMap::new()),
                notifier,
            }),
        }
    }

    pub async fn dispatch(&self, command: Command) -> Result<(), WorkflowError> {
        match command {
            Command::Connect => self.connect().await.map(|_| ()),
            Command::Refresh => {
                self.refresh_display().await;
                Ok(())
            }
            Command::Swap { amount_in } => self.swap(&amount_in).await,
            Command::AddLiquidity { amount_a, amount_b } => {
                self.add_liquidity(&amount_a, &amount_b).await
            }
            Command::RemoveLiquidity { liquidity } => self.remove_liquidity(&liquidity).await,
            Command::Mint(which) => self.mint(which).await,
            Command::ReverseOrder => {
                self.reverse_order().await;
                Ok(())
            }
        }
    }

    pub async fn display(&self) -> DisplayState {
        self.inner.state.read().await.display.clone()
    }

    pub async fn pair(&self) -> TokenPair {
        self.inner.state.read().await.pair
    }

    pub async fn phase(&self, kind: WorkflowKind) -> Phase {
        self.inner.state.read().await.phase(kind)
    }

    pub async fn session(&self) -> Option<Session> {
        self.inner.state.read().await.session.clone()
    }

    pub fn in_flight(&self, kind: WorkflowKind) -> usize {
        self.inner.in_flight().get(&kind).copied().unwrap_or(0)
    }

    pub async fn connect(&self) -> Result<Address, WorkflowError> {
        let gateway = match self.inner.wallet.request_account().await {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!("wallet 接続失敗: {}", e);
                return Err(WorkflowError::Connect(e));
            }
        };
        let address = gateway.caller();
        {
            let mut state = self.inner.state.write().await;
            state.session = Some(Session { address, gateway });
            state.display.wallet = Some(format!("✅ {}", shorten_address(&address)));
        }
        info!("wallet 接続: {:?}", address);
        self.refresh_display().await;
        Ok(address)
    }

    /// 価格と LP 残高を取り直す。失敗時は両方とも "-" に戻す
    pub async fn refresh_display(&self) {
        let (session, pair) = {
            let state = self.inner.state.read().await;
            (state.session.clone(), state.pair)
        };
        let Some(session) = session else {
            self.inner.state.write().await.display.set_unavailable();
            return;
        };

        let gateway = session.gateway.as_ref();
        let (price, liquidity) = tokio::join!(
            gateway.get_price(pair.token_a, pair.token_b),
            gateway.liquidity_balance(session.address)
        );
        let formatted = match (price, liquidity) {
            (Ok(price), Ok(liquidity)) => format_pair(price, liquidity),
            (Err(e), _) | (_, Err(e)) => Err(e.to_string()),
        };

        let mut state = self.inner.state.write().await;
        match formatted {
            Ok((price, liquidity)) => {
                state.display.price = price;
                state.display.liquidity = liquidity;
                state.display.token_a_label = shorten_address(&pair.token_a);
                state.display.token_b_label = shorten_address(&pair.token_b);
            }
            Err(e) => {
                warn!("表示更新に失敗しました: {}", e);
                state.display.set_unavailable();
            }
        }
    }

    pub async fn reverse_order(&self) {
        {
            let mut state = self.inner.state.write().await;
            state.pair.reverse();
        }
        self.refresh_display().await;
    }

    pub async fn swap(&self, amount_in: &str) -> Result<(), WorkflowError> {
        let deadline_secs = self.inner.settings.deadline_secs;
        self.run_workflow(WorkflowKind::Swap, "Initializing swap...", |session, pair| {
            let amount = parse_amount(amount_in).map_err(|source| WorkflowError::InvalidAmount {
                message: "Enter a valid amount.",
                source,
            })?;
            Ok(Plan::swap(
                pair,
                amount,
                session.address,
                session.gateway.venue(),
                deadline_secs,
            ))
        })
        .await
    }

    pub async fn add_liquidity(&self, amount_a: &str, amount_b: &str) -> Result<(), WorkflowError> {
        let deadline_secs = self.inner.settings.deadline_secs;
        self.run_workflow(WorkflowKind::AddLiquidity, "Initializing...", |session, pair| {
            let invalid = |source| WorkflowError::InvalidAmount {
                message: "Invalid amounts.",
                source,
            };
            let a = parse_amount(amount_a).map_err(invalid)?;
            let b = parse_amount(amount_b).map_err(invalid)?;
            Ok(Plan::add_liquidity(
                pair,
                a,
                b,
                session.address,
                session.gateway.venue(),
                deadline_secs,
            ))
        })
        .await
    }

    pub async fn remove_liquidity(&self, liquidity: &str) -> Result<(), WorkflowError> {
        let deadline_secs = self.inner.settings.deadline_secs;
        self.run_workflow(WorkflowKind::RemoveLiquidity, "Initializing...", |session, pair| {
            let amount = parse_amount(liquidity).map_err(|source| WorkflowError::InvalidAmount {
                message: "Invalid Amount",
                source,
            })?;
            Ok(Plan::remove_liquidity(
                pair,
                amount,
                session.address,
                session.gateway.venue(),
                deadline_secs,
            ))
        })
        .await
    }

    /// 既定の 2 トークンのどちらかを mint する。現在のペア順は見ない
    pub async fn mint(&self, which: MintTarget) -> Result<(), WorkflowError> {
        let settings = &self.inner.settings;
        let initial = format!("Minting {} Token {}...", settings.mint_label, which);
        self.run_workflow(WorkflowKind::Mint, &initial, |session, _pair| {
            Ok(Plan::mint(
                which,
                settings.mint_token(which),
                settings.mint_amount,
                &settings.mint_label,
                session.address,
            ))
        })
        .await
    }

    async fn run_workflow<F>(
        &self,
        kind: WorkflowKind,
        initial_status: &str,
        build: F,
    ) -> Result<(), WorkflowError>
    where
        F: FnOnce(&Session, TokenPair) -> Result<Plan, WorkflowError>,
    {
        let (session, pair, slot) = self.begin(kind, initial_status).await?;
        let result = self.drive(kind, &session, pair, build).await;
        self.finish(kind, &session, &result, slot).await;
        result
    }

    /// セッション確認と多重起動チェック。通ったら Validating に入る
    async fn begin(
        &self,
        kind: WorkflowKind,
        initial_status: &str,
    ) -> Result<(Session, TokenPair, InFlightSlot), WorkflowError> {
        let mut state = self.inner.state.write().await;
        let session = state.session.clone().ok_or(WorkflowError::NotConnected)?;
        {
            let mut counts = self.inner.in_flight();
            let count = counts.entry(kind).or_insert(0);
            if self.inner.settings.serialize_per_kind && *count > 0 {
                warn!("{}: 実行中のため拒否しました", kind);
                return Err(WorkflowError::Busy(kind));
            }
            *count += 1;
        }
        let slot = InFlightSlot {
            inner: self.inner.clone(),
            kind,
        };
        state.phases.insert(kind, Phase::Validating);
        state
            .display
            .statuses
            .insert(kind, initial_status.to_string());
        Ok((session, state.pair, slot))
    }

    async fn drive<F>(
        &self,
        kind: WorkflowKind,
        session: &Session,
        pair: TokenPair,
        build: F,
    ) -> Result<(), WorkflowError>
    where
        F: FnOnce(&Session, TokenPair) -> Result<Plan, WorkflowError>,
    {
        let plan = match build(session, pair) {
            Ok(plan) => plan,
            Err(e) => {
                self.set_status(kind, Phase::Failed, format!("❌ Error: {}", e.prompt()))
                    .await;
                return Err(e);
            }
        };
        let success_status = plan.success_status.clone();

        if let Err(failure) = execute(session.gateway.as_ref(), plan, self).await {
            let err = WorkflowError::Step {
                kind,
                index: failure.index,
                source: failure.error,
            };
            error!("{}", err);
            self.set_status(kind, Phase::Failed, err.prompt()).await;
            return Err(err);
        }

        self.set_status(kind, Phase::Refreshing, success_status).await;
        self.refresh_display().await;
        Ok(())
    }

    async fn finish(
        &self,
        kind: WorkflowKind,
        session: &Session,
        result: &Result<(), WorkflowError>,
        slot: InFlightSlot,
    ) {
        let status = {
            let mut state = self.inner.state.write().await;
            state.phases.insert(kind, Phase::Idle);
            state.display.status(kind).unwrap_or_default().to_string()
        };
        drop(slot);

        if let Some(notifier) = &self.inner.notifier {
            let caller = shorten_address(&session.address);
            let message = match result {
                Ok(()) => outcome_message(kind, &caller, Ok(&status)),
                Err(e) => outcome_message(kind, &caller, Err(&e.to_string())),
            };
            if let Err(e) = notifier.notify(&message).await {
                warn!("Discord 通知失敗: {}", e);
            }
        }
    }

    async fn set_status(&self, kind: WorkflowKind, phase: Phase, text: String) {
        let mut state = self.inner.state.write().await;
        state.phases.insert(kind, phase);
        state.display.statuses.insert(kind, text);
    }
}

#[async_trait]
impl StatusSink for Controller {
    async fn update(&self, kind: WorkflowKind, phase: Phase, text: String) {
        self.set_status(kind, phase, text).await;
    }
}

fn format_pair(price: U256, liquidity: U256) -> Result<(String, String), String> {
    let price = format_amount(price).map_err(|e| e.to_string())?;
    let liquidity = format_amount(liquidity).map_err(|e| e.to_string())?;
    Ok((price, liquidity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::UNAVAILABLE;
    use crate::testing::{MockGateway, MockWallet, Query, Submission};

    fn wei(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    fn settings() -> ControllerSettings {
        ControllerSettings {
            default_pair: TokenPair::new(
                Address::from_low_u64_be(0xa),
                Address::from_low_u64_be(0xb),
            ),
            deadline_secs: 300,
            mint_amount: wei(100),
            mint_label: "100".to_string(),
            serialize_per_kind: true,
        }
    }

    fn controller(gateway: MockGateway) -> Controller {
        Controller::new(Arc::new(MockWallet::new(gateway)), settings(), None)
    }

    #[tokio::test]
    async fn workflows_require_a_session() {
        let gateway = MockGateway::new();
        let c = controller(gateway.clone());

        assert!(matches!(c.swap("1").await, Err(WorkflowError::NotConnected)));
        assert!(matches!(
            c.add_liquidity("1", "1").await,
            Err(WorkflowError::NotConnected)
        ));
        assert!(matches!(
            c.remove_liquidity("1").await,
            Err(WorkflowError::NotConnected)
        ));
        assert!(matches!(
            c.mint(MintTarget::A).await,
            Err(WorkflowError::NotConnected)
        ));
        assert!(gateway.events().is_empty());
        assert_eq!(WorkflowError::NotConnected.prompt(), CONNECT_FIRST);
    }

    #[tokio::test]
    async fn connect_sets_session_and_refreshes() {
        let gateway = MockGateway::new();
        gateway.set_price(wei(2));
        gateway.set_liquidity(wei(7));
        let c = controller(gateway.clone());

        let address = c.connect().await.unwrap();
        assert_eq!(address, gateway.caller());

        let display = c.display().await;
        assert_eq!(display.price, "2.0");
        assert_eq!(display.liquidity, "7.0");
        assert!(display.wallet.unwrap().starts_with("✅ 0x"));
    }

    #[tokio::test]
    async fn rejected_connect_leaves_no_session() {
        let wallet = MockWallet::rejecting(
            MockGateway::new(),
            RemoteError::Unavailable("user rejected".into()),
        );
        let c = Controller::new(Arc::new(wallet), settings(), None);

        let err = c.connect().await.unwrap_err();
        assert!(err.prompt().starts_with("Error connecting wallet:"));
        assert!(c.session().await.is_none());
        assert!(c.display().await.wallet.is_none());
    }

    #[tokio::test]
    async fn refresh_without_session_is_unavailable() {
        let c = controller(MockGateway::new());
        c.refresh_display().await;
        let display = c.display().await;
        assert_eq!(display.price, UNAVAILABLE);
        assert_eq!(display.liquidity, UNAVAILABLE);
    }

    #[tokio::test]
    async fn refresh_failure_falls_back_to_unavailable() {
        let gateway = MockGateway::new();
        gateway.set_price(wei(3));
        let c = controller(gateway.clone());
        c.connect().await.unwrap();
        assert_eq!(c.display().await.price, "3.0");

        gateway.fail_reads(Some(RemoteError::Provider("timeout".into())));
        c.refresh_display().await;
        let display = c.display().await;
        assert_eq!(display.price, UNAVAILABLE);
        assert_eq!(display.liquidity, UNAVAILABLE);
    }

    #[tokio::test]
    async fn reverse_order_queries_price_in_new_order() {
        let gateway = MockGateway::new();
        let c = controller(gateway.clone());
        c.connect().await.unwrap();

        c.reverse_order().await;
        let pair = c.pair().await;
        assert_eq!(pair.token_a, Address::from_low_u64_be(0xb));
        assert!(gateway
            .queries()
            .contains(&Query::Price(pair.token_a, pair.token_b)));

        let display = c.display().await;
        assert_eq!(display.token_a_label, shorten_address(&pair.token_a));
    }

    #[tokio::test]
    async fn invalid_amounts_never_reach_the_gateway() {
        let gateway = MockGateway::new();
        let c = controller(gateway.clone());
        c.connect().await.unwrap();
        let before = gateway.submissions().len();

        for bad in ["", "0", "-1", "abc", "0.0"] {
            assert!(matches!(
                c.swap(bad).await,
                Err(WorkflowError::InvalidAmount { .. })
            ));
            assert!(matches!(
                c.add_liquidity("1", bad).await,
                Err(WorkflowError::InvalidAmount { .. })
            ));
            assert!(matches!(
                c.remove_liquidity(bad).await,
                Err(WorkflowError::InvalidAmount { .. })
            ));
        }
        assert_eq!(gateway.submissions().len(), before);

        let display = c.display().await;
        assert_eq!(
            display.status(WorkflowKind::Swap),
            Some("❌ Error: Enter a valid amount.")
        );
        assert_eq!(
            display.status(WorkflowKind::AddLiquidity),
            Some("❌ Error: Invalid amounts.")
        );
        assert_eq!(
            display.status(WorkflowKind::RemoveLiquidity),
            Some("❌ Error: Invalid Amount")
        );
        assert_eq!(c.phase(WorkflowKind::Swap).await, Phase::Idle);
    }

    #[tokio::test]
    async fn mint_ignores_reversed_pair() {
        let gateway = MockGateway::new();
        let c = controller(gateway.clone());
        c.connect().await.unwrap();
        c.reverse_order().await;

        c.mint(MintTarget::A).await.unwrap();
        assert_eq!(
            gateway.submissions(),
            vec![Submission::Mint {
                token: Address::from_low_u64_be(0xa),
                to: gateway.caller(),
                amount: wei(100),
            }]
        );
        assert_eq!(
            c.display().await.status(WorkflowKind::Mint),
            Some("✅ 100 Token A Minted!")
        );
    }

    #[tokio::test]
    async fn failed_step_reports_remote_reason() {
        let gateway = MockGateway::new();
        gateway.fail_confirmation(
            1,
            RemoteError::Rejected {
                reason: "SimpleSwap: EXPIRED".into(),
            },
        );
        let c = controller(gateway.clone());
        c.connect().await.unwrap();

        let err = c.swap("1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Step { index: 1, .. }));
        assert_eq!(
            c.display().await.status(WorkflowKind::Swap),
            Some("❌ Error: SimpleSwap: EXPIRED")
        );
        assert_eq!(c.phase(WorkflowKind::Swap).await, Phase::Idle);
        // 承認は取り消さない
        assert_eq!(gateway.submissions().len(), 2);
    }

    #[tokio::test]
    async fn second_trigger_of_same_kind_is_rejected_while_in_flight() {
        let gateway = MockGateway::new().gated();
        let c = controller(gateway.clone());
        c.connect().await.unwrap();

        let first = {
            let c = c.clone();
            tokio::spawn(async move { c.swap("1").await })
        };
        // 承認送信まで進むのを待つ
        while gateway.submissions().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(c.phase(WorkflowKind::Swap).await, Phase::AwaitingApproval);
        assert!(matches!(
            c.swap("1").await,
            Err(WorkflowError::Busy(WorkflowKind::Swap))
        ));

        gateway.release(2);
        first.await.unwrap().unwrap();
        assert_eq!(gateway.submissions().len(), 2);
        assert_eq!(c.phase(WorkflowKind::Swap).await, Phase::Idle);
    }

    #[tokio::test]
    async fn oversized_amount_is_rejected_and_releases_the_slot() {
        let gateway = MockGateway::new();
        let c = controller(gateway.clone());
        c.connect().await.unwrap();

        let oversized = format!("1{}", "0".repeat(60));
        assert!(matches!(
            c.swap(&oversized).await,
            Err(WorkflowError::InvalidAmount {
                source: UnitsError::Overflow(_),
                ..
            })
        ));
        assert!(gateway.submissions().is_empty());
        assert_eq!(c.in_flight(WorkflowKind::Swap), 0);

        c.swap("1").await.unwrap();
        assert_eq!(gateway.submissions().len(), 2);
    }

    #[tokio::test]
    async fn aborted_workflow_frees_its_kind() {
        let gateway = MockGateway::new().gated();
        let c = controller(gateway.clone());
        c.connect().await.unwrap();

        let first = {
            let c = c.clone();
            tokio::spawn(async move { c.swap("1").await })
        };
        while gateway.submissions().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(c.in_flight(WorkflowKind::Swap), 1);

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert_eq!(c.in_flight(WorkflowKind::Swap), 0);
        assert_eq!(c.phase(WorkflowKind::Swap).await, Phase::Idle);

        gateway.release(2);
        c.swap("1").await.unwrap();
        assert_eq!(gateway.submissions().len(), 3);
    }

    #[tokio::test]
    async fn unserialized_workflows_interleave() {
        let gateway = MockGateway::new().gated();
        let mut s = settings();
        s.serialize_per_kind = false;
        let c = Controller::new(Arc::new(MockWallet::new(gateway.clone())), s, None);
        c.connect().await.unwrap();

        let runs: Vec<_> = (0..2)
            .map(|_| {
                let c = c.clone();
                tokio::spawn(async move { c.swap("1").await })
            })
            .collect();
        while gateway.submissions().len() < 2 {
            tokio::task::yield_now().await;
        }
        gateway.release(4);
        for run in runs {
            run.await.unwrap().unwrap();
        }
        assert_eq!(gateway.submissions().len(), 4);
    }
}
