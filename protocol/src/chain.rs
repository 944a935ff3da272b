//! # Chain
//!
//! The execution environment a contract runs against: the clock, the block
//! height, every balance (via [`Bank`]), the optional lending pool, and the
//! per-account nonces that make signed calls non-replayable.
//!
//! `Chain` is plain data. It is `Clone` so a caller can snapshot it before a
//! state transition and restore it if the transition fails, and
//! `Serialize` so the node can persist it.
//!
//! Time only moves forward. A block timestamp earlier than the current one
//! still produces a block but leaves the clock where it is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::address::Address;
use crate::bank::Bank;
use crate::pool::{LendingPool, PoolError};

/// Errors raised by chain-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// The nonce on a signed call was not the account's next nonce.
    #[error("invalid nonce for {account}: expected {expected}, got {got}")]
    InvalidNonce {
        account: Address,
        expected: u64,
        got: u64,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Chain state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    chain_id: u64,
    height: u64,
    /// Unix seconds of the latest block.
    timestamp: u64,
    pub bank: Bank,
    pub pool: Option<LendingPool>,
    nonces: BTreeMap<Address, u64>,
}

impl Chain {
    /// A fresh chain at height 0 with an empty bank and no pool.
    pub fn new(chain_id: u64, genesis_timestamp: u64) -> Self {
        Self {
            chain_id,
            height: 0,
            timestamp: genesis_timestamp,
            bank: Bank::new(),
            pool: None,
            nonces: BTreeMap::new(),
        }
    }

    /// Attaches a lending pool.
    pub fn with_pool(mut self, pool: LendingPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Current block time in Unix seconds. This is `now` for every contract
    /// time check.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Produces a block at `timestamp`, accruing pool interest for the
    /// elapsed time.
    pub fn produce_block(&mut self, timestamp: u64) -> Result<(), ChainError> {
        let timestamp = timestamp.max(self.timestamp);
        if timestamp > self.timestamp {
            if let Some(pool) = self.pool.as_mut() {
                pool.accrue_all(&mut self.bank, timestamp)?;
            }
        }
        self.timestamp = timestamp;
        self.height += 1;
        Ok(())
    }

    /// Produces a block `secs` after the current one.
    pub fn advance_time(&mut self, secs: u64) -> Result<(), ChainError> {
        self.produce_block(self.timestamp.saturating_add(secs))
    }

    /// Split borrow of the pool and the bank, for code that moves funds
    /// through the pool.
    pub fn pool_and_bank_mut(&mut self) -> Option<(&mut LendingPool, &mut Bank)> {
        self.pool.as_mut().map(|pool| (pool, &mut self.bank))
    }

    // -- Nonces --------------------------------------------------------------

    /// The next nonce `account` must use.
    pub fn nonce(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    /// Consumes `nonce` for `account`. Only the exact next nonce is accepted.
    pub fn use_nonce(&mut self, account: Address, nonce: u64) -> Result<(), ChainError> {
        let expected = self.nonce(&account);
        if nonce != expected {
            return Err(ChainError::InvalidNonce {
                account,
                expected,
                got: nonce,
            });
        }
        self.nonces.insert(account, expected + 1);
        Ok(())
    }
}
