//! Centralized Contract Definitions
//!
//! Solidity interfaces for the Fluid DEX contracts the monitor reads from,
//! defined using alloy's `sol!` macro.
//!
//! Each interface is annotated with `#[sol(rpc)]` to generate
//! contract instance types that can make RPC calls via any alloy Provider.
//! Event definitions double as log decoders (`SolEvent::SIGNATURE_HASH`,
//! `Log::log_decode`).
//!
//! Author: AI-Generated
//! Created: 2026-10-14

use alloy::sol;

// ── ERC20 ─────────────────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

// ── ERC4626 vault (tracked asset accounting) ─────────────────────────

sol! {
    #[sol(rpc)]
    interface IERC4626 {
        function totalAssets() external view returns (uint256);
        function totalSupply() external view returns (uint256);
    }
}

// ── Fluid DEX reserves resolver ──────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IDexReservesResolver {
        struct CollateralReserves {
            uint256 token0RealReserves;
            uint256 token1RealReserves;
            uint256 token0ImaginaryReserves;
            uint256 token1ImaginaryReserves;
        }

        function getAllPoolAddresses() external view returns (address[] memory pools_);
        function getPoolTokens(address pool_) external view returns (address token0_, address token1_);
        function getDexCollateralReservesAdjusted(address dex_) external view returns (CollateralReserves memory reserves_);
    }
}

// ── Fluid DEX T1 pool ────────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IFluidDexT1 {
        struct ConstantViews {
            uint256 dexId;
            address liquidity;
            address factory;
            address token0;
            address token1;
        }

        event Swap(address indexed user, bool swap0to1, uint256 amountIn, uint256 amountOut, address to);
        event Deposit(address indexed user, uint256 sharesMinted, uint256 token0Amount, uint256 token1Amount);
        event Withdraw(address indexed user, uint256 sharesBurned, uint256 token0Amount, uint256 token1Amount);

        function constantsView() external view returns (ConstantViews memory);
    }
}

// ── Fluid liquidity layer ────────────────────────────────────────────

sol! {
    #[sol(rpc)]
    interface IFluidLiquidity {
        event LogOperate(
            address indexed user,
            address indexed token,
            int256 supplyAmount,
            int256 borrowAmount,
            address withdrawTo,
            address borrowTo,
            uint256 totalAmounts,
            uint256 exchangePricesAndConfig
        );
    }
}
