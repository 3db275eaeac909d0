use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use simpleswap_client::command::{Command, USAGE};
use simpleswap_client::config::AppConfig;
use simpleswap_client::controller::{Controller, ControllerSettings};
use simpleswap_client::evm_client::agent::EvmWalletProvider;
use simpleswap_client::notify::DiscordNotifier;
use simpleswap_client::state::DisplayState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();
    let cfg = AppConfig::load_default();

    let settings = match ControllerSettings::from_config(&cfg) {
        Ok(s) => s,
        Err(e) => {
            error!("設定の読み込みに失敗しました: {}", e);
            return;
        }
    };

    let wallet = match EvmWalletProvider::from_config(&cfg) {
        Ok(w) => Arc::new(w),
        Err(e) => {
            error!("wallet provider 初期化失敗: {}", e);
            return;
        }
    };

    let notifier = std::env::var(&cfg.discord.env_key)
        .ok()
        .map(DiscordNotifier::new);

    let controller = Controller::new(wallet, settings, notifier);

    println!("{}", USAGE);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut tasks = Vec::new();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("標準入力の読み込みに失敗: {}", e);
                break;
            }
        };
        match line.trim() {
            "" => continue,
            "quit" | "exit" => break,
            "help" => {
                println!("{}", USAGE);
                continue;
            }
            "status" => {
                print_display(&controller.display().await);
                continue;
            }
            _ => {}
        }

        let command = match line.parse::<Command>() {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        // ボタンと同じく、実行中でも次の入力を受け付ける
        let controller = controller.clone();
        tasks.push(tokio::spawn(async move {
            let label = command.to_string();
            match controller.dispatch(command).await {
                Ok(()) => info!("{}: 完了", label),
                Err(e) => println!("{}", e.prompt()),
            }
            print_display(&controller.display().await);
        }));
    }

    futures::future::join_all(tasks).await;
}

fn print_display(display: &DisplayState) {
    println!(
        "wallet: {}",
        display.wallet.as_deref().unwrap_or("(not connected)")
    );
    println!(
        "pair: {} / {}  price: {}  LP: {}",
        display.token_a_label, display.token_b_label, display.price, display.liquidity
    );
    for (kind, status) in &display.statuses {
        println!("  [{}] {}", kind, status);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("simpleswap クライアントを起動しました");
}
