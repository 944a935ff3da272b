//! # ERC-20 Style Tokens
//!
//! A faithful in-memory rendition of the ERC-20 surface the escrow contract
//! consumes: `balance_of`, `allowance`, `approve`, `transfer`,
//! `transfer_from`. `mint` exists for genesis seeding and the devnet faucet.
//!
//! Every mutation either applies fully or returns an error without touching
//! state. Overflow is checked on every credit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::address::Address;
use crate::amount::{as_decimal_str, Amount};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by token operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient balance: {account} holds {balance} of token {token}, needs {required}")]
    InsufficientBalance {
        token: Address,
        account: Address,
        balance: Amount,
        required: Amount,
    },

    #[error(
        "insufficient allowance: {spender} may spend {allowance} of {owner}'s token {token}, needs {required}"
    )]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        allowance: Amount,
        required: Amount,
    },

    #[error("invalid receiver: {0}")]
    InvalidReceiver(Address),

    #[error("balance overflow on token {0}")]
    Overflow(Address),

    #[error("unknown token: {0}")]
    UnknownToken(Address),

    #[error("token already registered: {0}")]
    AlreadyRegistered(Address),
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Public metadata for a token. This is what the API lists; balances stay
/// behind the accessor methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(with = "as_decimal_str")]
    pub total_supply: Amount,
}

/// An ERC-20 style fungible token ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Erc20Token {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    /// `owner -> (spender -> allowance)`.
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
}

impl Erc20Token {
    /// Creates a token with zero supply.
    pub fn new(address: Address, name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            total_supply: 0,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            address: self.address,
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            total_supply: self.total_supply,
        }
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Sets `spender`'s allowance over `owner`'s tokens. Overwrites, as in
    /// ERC-20.
    pub fn approve(&mut self, owner: Address, spender: Address, amount: Amount) -> Result<(), TokenError> {
        if spender.is_zero() {
            return Err(TokenError::InvalidReceiver(spender));
        }
        self.allowances.entry(owner).or_default().insert(spender, amount);
        Ok(())
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`TokenError::InvalidReceiver`] for the zero address,
    /// [`TokenError::InsufficientBalance`] if `from` cannot cover the amount.
    pub fn transfer(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver(to));
        }
        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(TokenError::InsufficientBalance {
                token: self.address,
                account: from,
                balance: from_balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow(self.address))?;

        self.balances.insert(from, from_balance - amount);
        self.balances.insert(to, to_balance);
        Ok(())
    }

    /// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance. An allowance of `Amount::MAX` is treated as infinite.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let allowance = self.allowance(&from, &spender);
        if allowance < amount {
            return Err(TokenError::InsufficientAllowance {
                token: self.address,
                owner: from,
                spender,
                allowance,
                required: amount,
            });
        }
        self.transfer(from, to, amount)?;
        if allowance != Amount::MAX {
            self.allowances
                .entry(from)
                .or_default()
                .insert(spender, allowance - amount);
        }
        Ok(())
    }

    /// Creates `amount` new tokens in `to`'s balance.
    pub fn mint(&mut self, to: Address, amount: Amount) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver(to));
        }
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::Overflow(self.address))?;
        let balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow(self.address))?;
        self.total_supply = supply;
        self.balances.insert(to, balance);
        Ok(())
    }
}
