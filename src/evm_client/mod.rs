// どこで: EVM 呼び出しのクライアントをまとめるモジュール
// 何を: ABI バインディング、リモート能力の trait、ethers による実装
// なぜ: 外部依存をここに閉じ込め、上位ロジックを簡潔にするため

pub mod agent;
pub mod bindings;
pub mod gateway;
