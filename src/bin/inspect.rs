// どこで: クイックデバッグ用バイナリ
// 何を: 既定ペアの価格・LP 残高・各トークン残高を query して表示する
// なぜ: UI を通さずに venue の状態と接続設定を確認するため

use simpleswap_client::config::AppConfig;
use simpleswap_client::evm_client::agent::EvmWalletProvider;
use simpleswap_client::evm_client::gateway::{DexGateway, WalletProvider};
use simpleswap_client::units::{format_amount, shorten_address};
use std::error::Error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cfg = AppConfig::load_default();
    let addresses = cfg.contracts.addresses()?;

    let wallet = EvmWalletProvider::from_config(&cfg)?;
    let gateway = wallet.request_account().await?;
    let caller = gateway.caller();

    println!("=== account ===");
    println!("caller: {:?} ({})", caller, shorten_address(&caller));
    println!("venue : {:?}", gateway.venue());

    let (price, lp) = tokio::join!(
        gateway.get_price(addresses.token_a, addresses.token_b),
        gateway.liquidity_balance(caller)
    );
    println!("=== venue ===");
    println!("price A/B : {}", format_amount(price?)?);
    println!("LP balance: {}", format_amount(lp?)?);

    println!("=== tokens ===");
    for (label, token) in [("A", addresses.token_a), ("B", addresses.token_b)] {
        match gateway.token_balance(token, caller).await {
            Ok(balance) => println!("token {} {:?}: {}", label, token, format_amount(balance)?),
            Err(e) => println!("token {} {:?}: 取得失敗 {}", label, token, e),
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
