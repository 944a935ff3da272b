//! # Bank: Native Balances and the Token Registry
//!
//! The bank holds every balance in the execution environment: the chain's
//! native currency per account, plus all registered [`Erc20Token`] ledgers.
//!
//! Callers address value through [`Asset`]. `Asset` is the one place where
//! "native vs token" is decided; everything above it (custody adapters,
//! the escrow contract) routes through [`Bank::balance_of`] and
//! [`Bank::transfer`] without branching on the zero address.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::address::Address;
use crate::amount::Amount;
use crate::token::{Erc20Token, TokenError, TokenInfo};

/// The asset an escrow is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum Asset {
    /// The chain's native currency.
    Native,
    /// An ERC-20 style token at the given address.
    Token(Address),
}

impl Asset {
    /// Resolves the ABI-level token address: the zero address is the native
    /// currency sentinel.
    pub fn from_token_addr(token_addr: Address) -> Self {
        if token_addr.is_zero() {
            Asset::Native
        } else {
            Asset::Token(token_addr)
        }
    }

    /// The ABI-level token address (zero for native).
    pub fn token_addr(&self) -> Address {
        match self {
            Asset::Native => Address::ZERO,
            Asset::Token(addr) => *addr,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Native => f.write_str("native"),
            Asset::Token(addr) => write!(f, "{}", addr),
        }
    }
}

/// All balances in the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bank {
    native: BTreeMap<Address, Amount>,
    native_supply: Amount,
    tokens: BTreeMap<Address, Erc20Token>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    // -- Token registry ------------------------------------------------------

    /// Registers a token ledger under its own address.
    pub fn register_token(&mut self, token: Erc20Token) -> Result<(), TokenError> {
        let addr = token.address();
        if addr.is_zero() {
            return Err(TokenError::InvalidReceiver(addr));
        }
        if self.tokens.contains_key(&addr) {
            return Err(TokenError::AlreadyRegistered(addr));
        }
        tracing::debug!(token = %addr, symbol = token.symbol(), "token registered");
        self.tokens.insert(addr, token);
        Ok(())
    }

    pub fn is_registered(&self, token: &Address) -> bool {
        self.tokens.contains_key(token)
    }

    pub fn token(&self, token: &Address) -> Result<&Erc20Token, TokenError> {
        self.tokens.get(token).ok_or(TokenError::UnknownToken(*token))
    }

    pub fn token_mut(&mut self, token: &Address) -> Result<&mut Erc20Token, TokenError> {
        self.tokens
            .get_mut(token)
            .ok_or(TokenError::UnknownToken(*token))
    }

    /// Metadata for every registered token, ordered by address.
    pub fn token_infos(&self) -> Vec<TokenInfo> {
        self.tokens.values().map(Erc20Token::info).collect()
    }

    /// Finds a token by its (case-insensitive) symbol.
    pub fn token_by_symbol(&self, symbol: &str) -> Option<&Erc20Token> {
        self.tokens
            .values()
            .find(|t| t.symbol().eq_ignore_ascii_case(symbol))
    }

    // -- Native currency -----------------------------------------------------

    pub fn native_balance_of(&self, account: &Address) -> Amount {
        self.native.get(account).copied().unwrap_or(0)
    }

    pub fn native_supply(&self) -> Amount {
        self.native_supply
    }

    /// Credits freshly issued native currency (genesis allocation, faucet).
    pub fn mint_native(&mut self, to: Address, amount: Amount) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver(to));
        }
        let supply = self
            .native_supply
            .checked_add(amount)
            .ok_or(TokenError::Overflow(Address::ZERO))?;
        let balance = self
            .native_balance_of(&to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow(Address::ZERO))?;
        self.native_supply = supply;
        self.native.insert(to, balance);
        Ok(())
    }

    fn transfer_native(&mut self, from: Address, to: Address, amount: Amount) -> Result<(), TokenError> {
        if to.is_zero() {
            return Err(TokenError::InvalidReceiver(to));
        }
        let from_balance = self.native_balance_of(&from);
        if from_balance < amount {
            return Err(TokenError::InsufficientBalance {
                token: Address::ZERO,
                account: from,
                balance: from_balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let to_balance = self
            .native_balance_of(&to)
            .checked_add(amount)
            .ok_or(TokenError::Overflow(Address::ZERO))?;
        self.native.insert(from, from_balance - amount);
        self.native.insert(to, to_balance);
        Ok(())
    }

    // -- Asset routing -------------------------------------------------------

    /// Balance of `account` in `asset`.
    pub fn balance_of(&self, asset: &Asset, account: &Address) -> Result<Amount, TokenError> {
        match asset {
            Asset::Native => Ok(self.native_balance_of(account)),
            Asset::Token(addr) => Ok(self.token(addr)?.balance_of(account)),
        }
    }

    /// Moves `amount` of `asset` from `from` to `to`.
    pub fn transfer(
        &mut self,
        asset: &Asset,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), TokenError> {
        match asset {
            Asset::Native => self.transfer_native(from, to, amount),
            Asset::Token(addr) => self.token_mut(addr)?.transfer(from, to, amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_with_dai() -> (Bank, Address) {
        let mut bank = Bank::new();
        let dai = Address::from_label("token:DAI");
        bank.register_token(Erc20Token::new(dai, "Dai", "DAI", 18))
            .unwrap();
        (bank, dai)
    }

    #[test]
    fn asset_resolution_from_token_addr() {
        assert_eq!(Asset::from_token_addr(Address::ZERO), Asset::Native);
        let dai = Address::from_label("token:DAI");
        assert_eq!(Asset::from_token_addr(dai), Asset::Token(dai));
        assert_eq!(Asset::Token(dai).token_addr(), dai);
        assert_eq!(Asset::Native.token_addr(), Address::ZERO);
    }

    #[test]
    fn native_transfer_moves_balance() {
        let mut bank = Bank::new();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        bank.mint_native(alice, 100).unwrap();
        bank.transfer(&Asset::Native, alice, bob, 30).unwrap();
        assert_eq!(bank.native_balance_of(&alice), 70);
        assert_eq!(bank.native_balance_of(&bob), 30);
        assert_eq!(bank.native_supply(), 100);
    }

    #[test]
    fn native_overdraft_rejected() {
        let mut bank = Bank::new();
        let alice = Address::from_label("alice");
        let err = bank
            .transfer(&Asset::Native, alice, Address::from_label("bob"), 1)
            .unwrap_err();
        assert!(matches!(err, TokenError::InsufficientBalance { balance: 0, .. }));
    }

    #[test]
    fn token_routing_goes_through_registry() {
        let (mut bank, dai) = bank_with_dai();
        let alice = Address::from_label("alice");
        bank.token_mut(&dai).unwrap().mint(alice, 50).unwrap();
        assert_eq!(bank.balance_of(&Asset::Token(dai), &alice).unwrap(), 50);

        let unknown = Asset::Token(Address::from_label("token:NOPE"));
        assert!(matches!(
            bank.balance_of(&unknown, &alice),
            Err(TokenError::UnknownToken(_))
        ));
    }

    #[test]
    fn duplicate_registration_rejected() {
        let (mut bank, dai) = bank_with_dai();
        let err = bank
            .register_token(Erc20Token::new(dai, "Dai", "DAI", 18))
            .unwrap_err();
        assert_eq!(err, TokenError::AlreadyRegistered(dai));
    }

    #[test]
    fn lookup_by_symbol_is_case_insensitive() {
        let (bank, dai) = bank_with_dai();
        assert_eq!(bank.token_by_symbol("dai").unwrap().address(), dai);
        assert!(bank.token_by_symbol("usdc").is_none());
    }
}
