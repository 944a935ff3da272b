//! # Protocol Configuration & Constants
//!
//! Every magic number in the escrow environment lives here. If you're
//! hardcoding a constant somewhere else, move it here instead.
//!
//! These values shape the devnet: chain id, block cadence, the token set a
//! fresh node registers at genesis and the lending pool's default rates.
//! Changing them invalidates existing snapshots (see [`STATE_SCHEMA_VERSION`]).

use std::time::Duration;

use crate::amount::Amount;

// ---------------------------------------------------------------------------
// Identifiers & Versions
// ---------------------------------------------------------------------------

/// Devnet chain id. Mixed into every signed call so a signature for one
/// chain cannot be replayed on another.
pub const CHAIN_ID: u64 = 0x4553_4357; // "ESCW"

/// Crate-level protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// On-disk snapshot schema. Bump whenever a persisted struct changes shape;
/// the store refuses to load snapshots written under a different version.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Domain separator prefixed to every signed call payload.
pub const CALL_SIGNING_DOMAIN: &[u8] = b"escrow-call-v1";

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Target block interval in milliseconds.
pub const BLOCK_TIME_MS: u64 = 2_000;

/// Target block interval as a `Duration`.
pub const BLOCK_TIME: Duration = Duration::from_millis(BLOCK_TIME_MS);

/// Seconds in a (non-leap) year; the pool's annual rates are expressed
/// against this.
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Lending Pool
// ---------------------------------------------------------------------------

/// Basis points denominator.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Default supply rate for devnet reserves: 3.5% APY, simple accrual.
pub const DEFAULT_POOL_RATE_BPS: u32 = 350;

/// Loan-to-value ratio reported in account data.
pub const POOL_LTV_BPS: u32 = 8_000;

/// Liquidation threshold reported in account data.
pub const POOL_LIQUIDATION_THRESHOLD_BPS: u32 = 8_250;

/// Label from which the devnet pool address is derived.
pub const POOL_LABEL: &str = "escrow-devnet:lending-pool";

// ---------------------------------------------------------------------------
// Devnet Tokens
// ---------------------------------------------------------------------------

/// A token the devnet registers at genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevnetToken {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u8,
    /// Whether genesis creates a pool reserve for it (yield custody only).
    pub pooled: bool,
}

/// Tokens available on a fresh devnet. The faucet mints any of them.
pub const DEVNET_TOKENS: &[DevnetToken] = &[
    DevnetToken { symbol: "DAI", name: "Dai Stablecoin", decimals: 18, pooled: true },
    DevnetToken { symbol: "USDC", name: "USD Coin", decimals: 6, pooled: true },
    DevnetToken { symbol: "LINK", name: "ChainLink Token", decimals: 18, pooled: true },
    DevnetToken { symbol: "WETH", name: "Wrapped Ether", decimals: 18, pooled: true },
    DevnetToken { symbol: "WBTC", name: "Wrapped BTC", decimals: 8, pooled: false },
];

/// Native decimals.
pub const NATIVE_DECIMALS: u8 = 18;

/// Largest single faucet mint, in whole tokens.
pub const FAUCET_MAX_WHOLE_TOKENS: u64 = 10_000;

/// Initial liquidity seeded into every pooled reserve at genesis, in whole
/// tokens, so withdrawals have something to draw from besides escrow funds.
pub const GENESIS_POOL_LIQUIDITY_WHOLE_TOKENS: u64 = 1_000_000;

/// Label prefix for devnet token addresses: `token:<SYMBOL>`.
pub fn devnet_token_label(symbol: &str) -> String {
    format!("token:{}", symbol.to_ascii_uppercase())
}

/// Label prefix for pool receipt-token addresses: `atoken:<SYMBOL>`.
pub fn a_token_label(symbol: &str) -> String {
    format!("atoken:{}", symbol.to_ascii_uppercase())
}

/// `whole * 10^decimals`, `None` on overflow.
pub fn whole_units(whole: u64, decimals: u8) -> Option<Amount> {
    10u128
        .checked_pow(u32::from(decimals))
        .and_then(|unit| unit.checked_mul(u128::from(whole)))
}

// ---------------------------------------------------------------------------
// Network Parameters
// ---------------------------------------------------------------------------

/// Default JSON-RPC / REST API port.
pub const DEFAULT_RPC_PORT: u16 = 9741;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9742;

/// Maximum page size for list endpoints. The contract itself never pages;
/// this only bounds HTTP responses.
pub const MAX_EVENTS_PER_RESPONSE: usize = 1_000;
