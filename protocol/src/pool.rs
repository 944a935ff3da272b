//! # Lending Pool
//!
//! A single-market lending pool in the shape of the Aave V3 `Pool` surface
//! the yield custody adapter talks to. Suppliers deposit an underlying token
//! and receive an interest-bearing position (the "aToken" balance) that grows
//! as the reserve's liquidity index grows.
//!
//! ## Accounting
//!
//! Positions are stored as *scaled* balances:
//!
//! ```text
//! scaled  = amount * WAD / liquidity_index        (on supply)
//! balance = scaled * liquidity_index / WAD        (on read)
//! ```
//!
//! The liquidity index starts at `WAD` and grows by simple interest at the
//! reserve's annual rate on every [`LendingPool::accrue`]. The interest is
//! minted to the pool's own address, standing in for repayments from
//! borrowers, so aToken balances always stay backed.
//!
//! Supply rounds the scaled amount up so a position never reads below what
//! was supplied; the pool mints the rounding difference to itself so the
//! reserve stays backed.
//!
//! [`LendingPool::withdraw`] is capped by both the supplier's position and
//! the pool's idle liquidity and reports the amount actually paid. A drained
//! pool pays out less than requested instead of failing, and callers decide
//! whether that is acceptable. [`LendingPool::withdraw_scaled`] redeems an
//! exact number of scaled units and fails outright when the pool cannot pay
//! their full value.
//!
//! Collateral and debt are reported in underlying base units with no price
//! conversion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::address::Address;
use crate::amount::{as_decimal_str, mul_div, Amount, WAD};
use crate::bank::Bank;
use crate::config::{BPS_DENOMINATOR, POOL_LIQUIDATION_THRESHOLD_BPS, POOL_LTV_BPS, SECONDS_PER_YEAR};
use crate::token::TokenError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the lending pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool has no reserve for this underlying token.
    #[error("asset not supported by pool: {0}")]
    UnsupportedAsset(Address),

    #[error("reserve already exists for {0}")]
    ReserveExists(Address),

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("insufficient liquidity in {asset}: available {available}, requested {requested}")]
    InsufficientLiquidity {
        asset: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("{holder} holds {held} scaled units of {asset}, {requested} requested")]
    InsufficientPosition {
        asset: Address,
        holder: Address,
        held: u128,
        requested: u128,
    },

    #[error("insufficient collateral for {user}: can borrow {available}, requested {requested}")]
    InsufficientCollateral {
        user: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("arithmetic overflow in pool accounting")]
    Overflow,

    #[error(transparent)]
    Token(#[from] TokenError),
}

// ---------------------------------------------------------------------------
// Reserve
// ---------------------------------------------------------------------------

/// Per-underlying state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reserve {
    underlying: Address,
    a_token: Address,
    liquidity_index: u128,
    rate_bps: u32,
    scaled_balances: BTreeMap<Address, u128>,
    scaled_total: u128,
    debts: BTreeMap<Address, Amount>,
    total_debt: Amount,
    last_update: u64,
}

impl Reserve {
    fn new(underlying: Address, a_token: Address, rate_bps: u32, now: u64) -> Self {
        Self {
            underlying,
            a_token,
            liquidity_index: WAD,
            rate_bps,
            scaled_balances: BTreeMap::new(),
            scaled_total: 0,
            debts: BTreeMap::new(),
            total_debt: 0,
            last_update: now,
        }
    }

    pub fn underlying(&self) -> Address {
        self.underlying
    }

    /// Address of the receipt token representing positions in this reserve.
    pub fn a_token(&self) -> Address {
        self.a_token
    }

    pub fn liquidity_index(&self) -> u128 {
        self.liquidity_index
    }

    pub fn rate_bps(&self) -> u32 {
        self.rate_bps
    }

    pub fn total_debt(&self) -> Amount {
        self.total_debt
    }

    pub fn scaled_balance_of(&self, holder: &Address) -> u128 {
        self.scaled_balances.get(holder).copied().unwrap_or(0)
    }

    fn to_balance(&self, scaled: u128) -> Amount {
        mul_div(scaled, self.liquidity_index, WAD).unwrap_or(Amount::MAX)
    }

    /// Sum of all supplier positions in underlying units.
    pub fn total_supplied(&self) -> Amount {
        self.to_balance(self.scaled_total)
    }

    pub fn balance_of(&self, holder: &Address) -> Amount {
        self.to_balance(self.scaled_balance_of(holder))
    }

    fn debt_of(&self, holder: &Address) -> Amount {
        self.debts.get(holder).copied().unwrap_or(0)
    }
}

/// Summary of a user's pool position, mirroring Aave's `getUserAccountData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    #[serde(with = "as_decimal_str")]
    pub total_collateral_base: Amount,
    #[serde(with = "as_decimal_str")]
    pub total_debt_base: Amount,
    #[serde(with = "as_decimal_str")]
    pub available_borrows_base: Amount,
    pub current_liquidation_threshold: u32,
    pub ltv: u32,
    /// WAD-scaled; `u128::MAX` when there is no debt.
    #[serde(with = "as_decimal_str")]
    pub health_factor: u128,
}

// ---------------------------------------------------------------------------
// LendingPool
// ---------------------------------------------------------------------------

/// The lending pool. Holds underlying liquidity at its own [`address`](Self::address)
/// in the [`Bank`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LendingPool {
    address: Address,
    reserves: BTreeMap<Address, Reserve>,
}

impl LendingPool {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            reserves: BTreeMap::new(),
        }
    }

    /// The pool's account in the bank. Suppliers approve this address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Lists a new reserve.
    pub fn add_reserve(
        &mut self,
        underlying: Address,
        a_token: Address,
        rate_bps: u32,
        now: u64,
    ) -> Result<(), PoolError> {
        if self.reserves.contains_key(&underlying) {
            return Err(PoolError::ReserveExists(underlying));
        }
        tracing::debug!(asset = %underlying, rate_bps, "pool reserve listed");
        self.reserves
            .insert(underlying, Reserve::new(underlying, a_token, rate_bps, now));
        Ok(())
    }

    pub fn supports(&self, asset: &Address) -> bool {
        self.reserves.contains_key(asset)
    }

    pub fn reserve(&self, asset: &Address) -> Result<&Reserve, PoolError> {
        self.reserves
            .get(asset)
            .ok_or(PoolError::UnsupportedAsset(*asset))
    }

    pub fn reserves(&self) -> impl Iterator<Item = &Reserve> {
        self.reserves.values()
    }

    /// The interest-bearing position of `holder` in `asset`, in underlying
    /// units. Zero for unknown reserves.
    pub fn a_token_balance_of(&self, asset: &Address, holder: &Address) -> Amount {
        self.reserves
            .get(asset)
            .map(|r| r.balance_of(holder))
            .unwrap_or(0)
    }

    /// Pulls `amount` of `asset` from `from` (which must have approved the
    /// pool) and credits the position to `on_behalf_of`.
    ///
    /// Returns the scaled amount minted.
    ///
    /// # Errors
    ///
    /// [`PoolError::UnsupportedAsset`], [`PoolError::ZeroAmount`], or the
    /// underlying [`TokenError`] from `transfer_from`.
    pub fn supply(
        &mut self,
        bank: &mut Bank,
        asset: Address,
        amount: Amount,
        from: Address,
        on_behalf_of: Address,
    ) -> Result<u128, PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let pool_addr = self.address;
        let reserve = self
            .reserves
            .get_mut(&asset)
            .ok_or(PoolError::UnsupportedAsset(asset))?;

        // Rounded up so the position is never worth less than what was supplied.
        let floor = mul_div(amount, WAD, reserve.liquidity_index).ok_or(PoolError::Overflow)?;
        let scaled = if reserve.to_balance(floor) < amount {
            floor.checked_add(1).ok_or(PoolError::Overflow)?
        } else {
            floor
        };
        let new_total = reserve
            .scaled_total
            .checked_add(scaled)
            .ok_or(PoolError::Overflow)?;
        let new_balance = reserve
            .scaled_balance_of(&on_behalf_of)
            .checked_add(scaled)
            .ok_or(PoolError::Overflow)?;
        let owed = mul_div(new_total, reserve.liquidity_index, WAD)
            .ok_or(PoolError::Overflow)?
            .saturating_sub(reserve.total_supplied());

        let token = bank.token_mut(&asset)?;
        token.transfer_from(pool_addr, from, pool_addr, amount)?;
        if owed > amount {
            token.mint(pool_addr, owed - amount)?;
        }

        reserve.scaled_total = new_total;
        reserve.scaled_balances.insert(on_behalf_of, new_balance);
        tracing::trace!(asset = %asset, amount, scaled, "pool supply");
        Ok(scaled)
    }

    /// Withdraws up to `amount` of `owner`'s position in `asset` and sends it
    /// to `to`. `Amount::MAX` means "everything".
    ///
    /// The payout is capped by the position and by the pool's idle liquidity;
    /// the amount actually paid is returned.
    pub fn withdraw(
        &mut self,
        bank: &mut Bank,
        asset: Address,
        amount: Amount,
        owner: Address,
        to: Address,
    ) -> Result<Amount, PoolError> {
        let pool_addr = self.address;
        let reserve = self
            .reserves
            .get_mut(&asset)
            .ok_or(PoolError::UnsupportedAsset(asset))?;

        let scaled_position = reserve.scaled_balance_of(&owner);
        let position = reserve.to_balance(scaled_position);
        let available = bank.token(&asset)?.balance_of(&pool_addr);
        let paid = amount.min(position).min(available);
        if paid == 0 {
            return Ok(0);
        }

        let scaled_burn = if paid == position {
            scaled_position
        } else {
            // Round the burn up so the pool never pays out more than it burns.
            let floor = mul_div(paid, WAD, reserve.liquidity_index).ok_or(PoolError::Overflow)?;
            let burn = if reserve.to_balance(floor) < paid {
                floor.saturating_add(1)
            } else {
                floor
            };
            burn.min(scaled_position)
        };

        bank.token_mut(&asset)?.transfer(pool_addr, to, paid)?;

        let remaining = scaled_position - scaled_burn;
        if remaining == 0 {
            reserve.scaled_balances.remove(&owner);
        } else {
            reserve.scaled_balances.insert(owner, remaining);
        }
        reserve.scaled_total = reserve.scaled_total.saturating_sub(scaled_burn);
        tracing::trace!(asset = %asset, requested = amount, paid, "pool withdraw");
        Ok(paid)
    }

    /// Burns exactly `scaled` units of `owner`'s position in `asset` and
    /// sends their full value to `to`. Nothing moves unless the pool can pay
    /// all of it.
    ///
    /// # Errors
    ///
    /// [`PoolError::InsufficientPosition`] if `owner` holds fewer units,
    /// [`PoolError::InsufficientLiquidity`] if the pool's idle balance does
    /// not cover the value.
    pub fn withdraw_scaled(
        &mut self,
        bank: &mut Bank,
        asset: Address,
        scaled: u128,
        owner: Address,
        to: Address,
    ) -> Result<Amount, PoolError> {
        if scaled == 0 {
            return Err(PoolError::ZeroAmount);
        }
        let pool_addr = self.address;
        let reserve = self
            .reserves
            .get_mut(&asset)
            .ok_or(PoolError::UnsupportedAsset(asset))?;

        let held = reserve.scaled_balance_of(&owner);
        if held < scaled {
            return Err(PoolError::InsufficientPosition {
                asset,
                holder: owner,
                held,
                requested: scaled,
            });
        }
        let value = mul_div(scaled, reserve.liquidity_index, WAD).ok_or(PoolError::Overflow)?;
        let available = bank.token(&asset)?.balance_of(&pool_addr);
        if available < value {
            return Err(PoolError::InsufficientLiquidity {
                asset,
                available,
                requested: value,
            });
        }

        if value > 0 {
            bank.token_mut(&asset)?.transfer(pool_addr, to, value)?;
        }
        let remaining = held - scaled;
        if remaining == 0 {
            reserve.scaled_balances.remove(&owner);
        } else {
            reserve.scaled_balances.insert(owner, remaining);
        }
        reserve.scaled_total = reserve.scaled_total.saturating_sub(scaled);
        tracing::trace!(asset = %asset, scaled, value, "pool withdraw scaled");
        Ok(value)
    }

    /// Grows the liquidity index of `asset` by `elapsed_secs` worth of simple
    /// interest and mints the accrued interest to the pool.
    pub fn accrue(&mut self, bank: &mut Bank, asset: Address, elapsed_secs: u64) -> Result<Amount, PoolError> {
        let pool_addr = self.address;
        let reserve = self
            .reserves
            .get_mut(&asset)
            .ok_or(PoolError::UnsupportedAsset(asset))?;
        let last_update = reserve.last_update.saturating_add(elapsed_secs);
        if elapsed_secs == 0 || reserve.rate_bps == 0 {
            reserve.last_update = last_update;
            return Ok(0);
        }

        let before = reserve.total_supplied();
        let numerator = u128::from(reserve.rate_bps)
            .checked_mul(u128::from(elapsed_secs))
            .ok_or(PoolError::Overflow)?;
        let denominator = BPS_DENOMINATOR * u128::from(SECONDS_PER_YEAR);
        let growth = mul_div(reserve.liquidity_index, numerator, denominator).ok_or(PoolError::Overflow)?;
        let new_index = reserve
            .liquidity_index
            .checked_add(growth)
            .ok_or(PoolError::Overflow)?;
        let after = mul_div(reserve.scaled_total, new_index, WAD).ok_or(PoolError::Overflow)?;
        let interest = after.saturating_sub(before);

        if interest > 0 {
            bank.token_mut(&asset)?.mint(pool_addr, interest)?;
        }
        reserve.liquidity_index = new_index;
        reserve.last_update = last_update;
        Ok(interest)
    }

    /// Accrues every reserve up to `now`.
    pub fn accrue_all(&mut self, bank: &mut Bank, now: u64) -> Result<(), PoolError> {
        let pending: Vec<(Address, u64)> = self
            .reserves
            .values()
            .map(|r| (r.underlying, now.saturating_sub(r.last_update)))
            .filter(|(_, elapsed)| *elapsed > 0)
            .collect();
        for (asset, elapsed) in pending {
            self.accrue(bank, asset, elapsed)?;
        }
        Ok(())
    }

    /// Borrows `amount` of `asset` against the borrower's collateral.
    ///
    /// Debt does not accrue interest; this exists so a devnet (or a test)
    /// can drain a reserve's idle liquidity.
    pub fn borrow(
        &mut self,
        bank: &mut Bank,
        asset: Address,
        amount: Amount,
        borrower: Address,
    ) -> Result<(), PoolError> {
        if amount == 0 {
            return Err(PoolError::ZeroAmount);
        }
        if !self.supports(&asset) {
            return Err(PoolError::UnsupportedAsset(asset));
        }
        let account = self.user_account_data(&borrower);
        if account.available_borrows_base < amount {
            return Err(PoolError::InsufficientCollateral {
                user: borrower,
                available: account.available_borrows_base,
                requested: amount,
            });
        }
        let available = bank.token(&asset)?.balance_of(&self.address);
        if available < amount {
            return Err(PoolError::InsufficientLiquidity {
                asset,
                available,
                requested: amount,
            });
        }

        let pool_addr = self.address;
        let reserve = self
            .reserves
            .get_mut(&asset)
            .ok_or(PoolError::UnsupportedAsset(asset))?;
        let new_debt = reserve
            .debt_of(&borrower)
            .checked_add(amount)
            .ok_or(PoolError::Overflow)?;
        let new_total = reserve
            .total_debt
            .checked_add(amount)
            .ok_or(PoolError::Overflow)?;
        bank.token_mut(&asset)?.transfer(pool_addr, borrower, amount)?;
        reserve.debts.insert(borrower, new_debt);
        reserve.total_debt = new_total;
        Ok(())
    }

    /// Aggregate collateral and debt for `user` across all reserves.
    pub fn user_account_data(&self, user: &Address) -> AccountData {
        let collateral = self
            .reserves
            .values()
            .fold(0u128, |acc, r| acc.saturating_add(r.balance_of(user)));
        let debt = self
            .reserves
            .values()
            .fold(0u128, |acc, r| acc.saturating_add(r.debt_of(user)));

        let borrow_limit =
            mul_div(collateral, u128::from(POOL_LTV_BPS), BPS_DENOMINATOR).unwrap_or(Amount::MAX);
        let health_factor = if debt == 0 {
            u128::MAX
        } else {
            mul_div(collateral, u128::from(POOL_LIQUIDATION_THRESHOLD_BPS), BPS_DENOMINATOR)
                .and_then(|adjusted| mul_div(adjusted, WAD, debt))
                .unwrap_or(u128::MAX)
        };

        AccountData {
            total_collateral_base: collateral,
            total_debt_base: debt,
            available_borrows_base: borrow_limit.saturating_sub(debt),
            current_liquidation_threshold: POOL_LIQUIDATION_THRESHOLD_BPS,
            ltv: POOL_LTV_BPS,
            health_factor,
        }
    }
}
