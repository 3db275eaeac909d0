// どこで: 承認 → 実行のトランザクション手順
// 何を: 各操作を順序付きのステップ列に組み立て、先頭から実行し最初の失敗で止める
// なぜ: 「巻き戻しなし・再試行なし」を明示的なデータとして扱うため

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use futures::future::try_join;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

use crate::evm_client::gateway::{
    AddLiquidityParams, DexGateway, RemoteError, RemoveLiquidityParams, SwapParams,
};
use crate::state::{MintTarget, Phase, TokenPair, WorkflowKind};

/// 承認 1 件分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approval {
    pub token: Address,
    pub spender: Address,
    pub amount: U256,
    pub status: String,
}

/// venue / トークンへの実行呼び出し。deadline は送信直前に埋める
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Swap(SwapParams),
    AddLiquidity(AddLiquidityParams),
    RemoveLiquidity(RemoveLiquidityParams),
    Mint {
        token: Address,
        to: Address,
        amount: U256,
    },
}

impl Execution {
    fn stamp_deadline(&mut self, deadline: U256) {
        match self {
            Execution::Swap(p) => p.deadline = deadline,
            Execution::AddLiquidity(p) => p.deadline = deadline,
            Execution::RemoveLiquidity(p) => p.deadline = deadline,
            Execution::Mint { .. } => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// 送信して確認まで待つ
    Approve(Approval),
    /// 2 件を続けて送信し、確認はまとめて待つ
    ApprovePair(Approval, Approval),
    Execute { call: Execution, status: String },
}

impl Step {
    pub fn phase(&self) -> Phase {
        match self {
            Step::Approve(_) | Step::ApprovePair(..) => Phase::AwaitingApproval,
            Step::Execute { .. } => Phase::AwaitingExecution,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: WorkflowKind,
    pub steps: Vec<Step>,
    pub success_status: String,
    pub deadline_secs: u64,
}

impl Plan {
    pub fn swap(
        pair: TokenPair,
        amount_in: U256,
        caller: Address,
        venue: Address,
        deadline_secs: u64,
    ) -> Self {
        Plan {
            kind: WorkflowKind::Swap,
            steps: vec![
                Step::Approve(Approval {
                    token: pair.token_a,
                    spender: venue,
                    amount: amount_in,
                    status: "Approving tokens...".to_string(),
                }),
                Step::Execute {
                    call: Execution::Swap(SwapParams {
                        amount_in,
                        amount_out_min: U256::zero(),
                        path: pair.path(),
                        to: caller,
                        deadline: U256::zero(),
                    }),
                    status: "Making swap...".to_string(),
                },
            ],
            success_status: "✅ Swap Completed!".to_string(),
            deadline_secs,
        }
    }

    pub fn add_liquidity(
        pair: TokenPair,
        amount_a: U256,
        amount_b: U256,
        caller: Address,
        venue: Address,
        deadline_secs: u64,
    ) -> Self {
        Plan {
            kind: WorkflowKind::AddLiquidity,
            steps: vec![
                Step::ApprovePair(
                    Approval {
                        token: pair.token_a,
                        spender: venue,
                        amount: amount_a,
                        status: "Approving Token A...".to_string(),
                    },
                    Approval {
                        token: pair.token_b,
                        spender: venue,
                        amount: amount_b,
                        status: "Approving Token B...".to_string(),
                    },
                ),
                Step::Execute {
                    call: Execution::AddLiquidity(AddLiquidityParams {
                        token_a: pair.token_a,
                        token_b: pair.token_b,
                        amount_a_desired: amount_a,
                        amount_b_desired: amount_b,
                        amount_a_min: U256::zero(),
                        amount_b_min: U256::zero(),
                        to: caller,
                        deadline: U256::zero(),
                    }),
                    status: "Adding Liquidity...".to_string(),
                },
            ],
            success_status: "✅ Liquidity Added!".to_string(),
            deadline_secs,
        }
    }

    /// LP シェアは venue 自身がトークンとして発行しているので、承認先トークンも venue
    pub fn remove_liquidity(
        pair: TokenPair,
        liquidity: U256,
        caller: Address,
        venue: Address,
        deadline_secs: u64,
    ) -> Self {
        Plan {
            kind: WorkflowKind::RemoveLiquidity,
            steps: vec![
                Step::Approve(Approval {
                    token: venue,
                    spender: venue,
                    amount: liquidity,
                    status: "Approving LP tokens...".to_string(),
                }),
                Step::Execute {
                    call: Execution::RemoveLiquidity(RemoveLiquidityParams {
                        token_a: pair.token_a,
                        token_b: pair.token_b,
                        liquidity,
                        amount_a_min: U256::zero(),
                        amount_b_min: U256::zero(),
                        to: caller,
                        deadline: U256::zero(),
                    }),
                    status: "Removing LP Tokens...".to_string(),
                },
            ],
            success_status: "✅ Liquidity removed!".to_string(),
            deadline_secs,
        }
    }

    pub fn mint(
        which: MintTarget,
        token: Address,
        amount: U256,
        amount_label: &str,
        caller: Address,
    ) -> Self {
        Plan {
            kind: WorkflowKind::Mint,
            steps: vec![Step::Execute {
                call: Execution::Mint {
                    token,
                    to: caller,
                    amount,
                },
                status: format!("Minting {} Token {}...", amount_label, which),
            }],
            success_status: format!("✅ {} Token {} Minted!", amount_label, which),
            deadline_secs: 0,
        }
    }
}

/// 成功したステップと、そこで送ったトランザクション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub index: usize,
    pub txs: Vec<TxHash>,
}

/// 失敗したステップ。以降のステップは送信していない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub index: usize,
    pub error: RemoteError,
}

/// 進捗表示の受け口
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update(&self, kind: WorkflowKind, phase: Phase, text: String);
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// ステップ列を先頭から実行する。失敗したら残りは送らずに返す
pub async fn execute(
    gateway: &dyn DexGateway,
    plan: Plan,
    sink: &dyn StatusSink,
) -> Result<Vec<StepOutcome>, StepFailure> {
    let kind = plan.kind;
    let mut outcomes = Vec::with_capacity(plan.steps.len());

    for (index, step) in plan.steps.into_iter().enumerate() {
        let phase = step.phase();
        let result = match step {
            Step::Approve(approval) => {
                sink.update(kind, phase, approval.status.clone()).await;
                approve_and_wait(gateway, &approval).await.map(|tx| vec![tx])
            }
            Step::ApprovePair(first, second) => {
                approve_pair(gateway, kind, phase, &first, &second, sink).await
            }
            Step::Execute { mut call, status } => {
                sink.update(kind, phase, status).await;
                let deadline = U256::from(unix_now() + plan.deadline_secs);
                call.stamp_deadline(deadline);
                execute_and_wait(gateway, call).await.map(|tx| vec![tx])
            }
        };

        match result {
            Ok(txs) => {
                info!("{}: ステップ {} 完了 {:?}", kind, index, txs);
                outcomes.push(StepOutcome { index, txs });
            }
            Err(error) => {
                error!("{}: ステップ {} 失敗: {}", kind, index, error);
                return Err(StepFailure { index, error });
            }
        }
    }

    Ok(outcomes)
}

async fn approve_and_wait(
    gateway: &dyn DexGateway,
    approval: &Approval,
) -> Result<TxHash, RemoteError> {
    let tx = gateway
        .approve(approval.token, approval.spender, approval.amount)
        .await?;
    gateway.confirm(tx).await?;
    Ok(tx)
}

async fn approve_pair(
    gateway: &dyn DexGateway,
    kind: WorkflowKind,
    phase: Phase,
    first: &Approval,
    second: &Approval,
    sink: &dyn StatusSink,
) -> Result<Vec<TxHash>, RemoteError> {
    sink.update(kind, phase, first.status.clone()).await;
    let first_tx = gateway
        .approve(first.token, first.spender, first.amount)
        .await?;

    sink.update(kind, phase, second.status.clone()).await;
    let second_tx = gateway
        .approve(second.token, second.spender, second.amount)
        .await?;

    try_join(gateway.confirm(first_tx), gateway.confirm(second_tx)).await?;
    Ok(vec![first_tx, second_tx])
}

async fn execute_and_wait(
    gateway: &dyn DexGateway,
    call: Execution,
) -> Result<TxHash, RemoteError> {
    let tx = match call {
        Execution::Swap(params) => gateway.swap_exact_tokens_for_tokens(params).await?,
        Execution::AddLiquidity(params) => gateway.add_liquidity(params).await?,
        Execution::RemoveLiquidity(params) => gateway.remove_liquidity(params).await?,
        Execution::Mint { token, to, amount } => gateway.mint(token, to, amount).await?,
    };
    gateway.confirm(tx).await?;
    Ok(tx)
}
