// どこで: コントラクト ABI バインディング
// 何を: テストトークンと SimpleSwap venue の呼び出し型を abigen で生成する
// なぜ: 関数シグネチャを手書きエンコードせずに型付きで呼ぶため

use ethers::prelude::abigen;

abigen!(
    TestToken,
    r#"[
        function balanceOf(address) external view returns (uint256)
        function mint(address to, uint256 amount) external
        function approve(address spender, uint256 amount) external returns (bool)
    ]"#,
);

abigen!(
    SimpleSwap,
    r#"[
        function addLiquidity(address tokenA, address tokenB, uint256 amountADesired, uint256 amountBDesired, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB, uint256 liquidity)
        function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external returns (uint256[] memory)
        function getPrice(address tokenA, address tokenB) external view returns (uint256 price)
        function removeLiquidity(address tokenA, address tokenB, uint256 liquidity, uint256 amountAMin, uint256 amountBMin, address to, uint256 deadline) external returns (uint256 amountA, uint256 amountB)
        function balanceOf(address account) external view returns (uint256)
    ]"#,
);
