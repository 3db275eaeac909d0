// どこで: UI 操作とコントローラの間のコマンド定義
// 何を: ボタン 1 つにつき 1 コマンド、コンソール入力行からのパース
// なぜ: コントローラを UI フレームワークから切り離すため

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::state::MintTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect,
    Refresh,
    Swap { amount_in: String },
    AddLiquidity { amount_a: String, amount_b: String },
    RemoveLiquidity { liquidity: String },
    Mint(MintTarget),
    ReverseOrder,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("不明なコマンドです: {0}")]
    Unknown(String),
    #[error("{command} の引数が足りません: {usage}")]
    MissingArgument {
        command: &'static str,
        usage: &'static str,
    },
    #[error("mint 対象は A か B です: {0}")]
    InvalidMintTarget(String),
}

pub const USAGE: &str = "\
connect              wallet に接続
refresh              価格と LP 残高を再取得
swap <amount>        tokenA → tokenB をスワップ
add <amountA> <amountB>
                     流動性を追加
remove <lp>          流動性を引き出す
mint <A|B>           テストトークンを mint
reverse              ペアの順序を入れ替え
status               表示内容を出力
quit                 終了";

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let head = parts.next().unwrap_or_default().to_ascii_lowercase();
        // 金額の妥当性はコントローラ側で検証する
        let mut arg = |command: &'static str, usage: &'static str| {
            parts
                .next()
                .map(str::to_string)
                .ok_or(CommandParseError::MissingArgument { command, usage })
        };

        match head.as_str() {
            "connect" => Ok(Command::Connect),
            "refresh" => Ok(Command::Refresh),
            "reverse" => Ok(Command::ReverseOrder),
            "swap" => Ok(Command::Swap {
                amount_in: arg("swap", "swap <amount>")?,
            }),
            "add" => {
                let amount_a = arg("add", "add <amountA> <amountB>")?;
                let amount_b = arg("add", "add <amountA> <amountB>")?;
                Ok(Command::AddLiquidity { amount_a, amount_b })
            }
            "remove" => Ok(Command::RemoveLiquidity {
                liquidity: arg("remove", "remove <lp>")?,
            }),
            "mint" => {
                let target = arg("mint", "mint <A|B>")?;
                match target.to_ascii_uppercase().as_str() {
                    "A" => Ok(Command::Mint(MintTarget::A)),
                    "B" => Ok(Command::Mint(MintTarget::B)),
                    _ => Err(CommandParseError::InvalidMintTarget(target)),
                }
            }
            _ => Err(CommandParseError::Unknown(line.trim().to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "connect"),
            Command::Refresh => write!(f, "refresh"),
            Command::Swap { amount_in } => write!(f, "swap {}", amount_in),
            Command::AddLiquidity { amount_a, amount_b } => {
                write!(f, "add {} {}", amount_a, amount_b)
            }
            Command::RemoveLiquidity { liquidity } => write!(f, "remove {}", liquidity),
            Command::Mint(target) => write!(f, "mint {}", target),
            Command::ReverseOrder => write!(f, "reverse"),
        }
    }
}
