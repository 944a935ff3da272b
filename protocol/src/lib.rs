// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Escrow Protocol: Execution Environment
//!
//! Everything the escrow contract runs against, and nothing it doesn't.
//! The contract itself lives in `escrow-contracts`; this crate supplies the
//! world around it: who can hold value, how value moves, what time it is.
//!
//! ## Architecture
//!
//! - **address**: 20-byte account identifiers, `0x`-hex on the wire.
//! - **amount**: `u128` amounts, WAD fixed-point helpers, decimal-string serde.
//! - **crypto**: Ed25519 keys and signature checks for signed calls.
//! - **token**: ERC-20 style token ledgers.
//! - **bank**: native balances, the token registry, and [`bank::Asset`] routing.
//! - **pool**: an interest-bearing lending pool (supply, withdraw, accrue).
//! - **chain**: clock, block height, nonces; owns the bank and the pool.
//! - **storage**: sled-backed snapshot persistence.
//! - **config**: protocol constants and devnet parameters.
//!
//! ## Design Philosophy
//!
//! 1. Balances never go negative and never overflow silently.
//! 2. A failed operation leaves state untouched.
//! 3. If it touches money, it has tests. Plural.

pub mod address;
pub mod amount;
pub mod bank;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod pool;
pub mod storage;
pub mod token;

pub use address::Address;
pub use amount::Amount;
pub use bank::{Asset, Bank};
pub use chain::{Chain, ChainError};
pub use pool::{AccountData, LendingPool, PoolError};
pub use token::{Erc20Token, TokenError, TokenInfo};
