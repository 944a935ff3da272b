//! Yield custody: token deposits are supplied to the lending pool.
//!
//! The contract holds one aggregate pool position. This adapter keeps the
//! per-escrow share of it as scaled units, so each escrow's claim grows
//! with the pool's liquidity index independently of deposits made later.
//!
//! On release the escrow's scaled units are redeemed in full and the whole
//! claim (principal plus accrued interest) is forwarded to the recipient.
//! The pool either pays the full claim or nothing; a pool that cannot, or a
//! claim below the principal, surfaces as
//! [`EscrowError::ErrorWithdrawFromPool`] and the escrow stays active.

use escrow_protocol::amount::{mul_div, WAD};
use escrow_protocol::{Address, Amount, Asset, Chain};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Custody, CustodyContext, CustodyKind};
use crate::error::EscrowError;

/// One escrow's share of the contract's pool position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YieldPosition {
    pub token: Address,
    pub principal: Amount,
    /// Scaled pool units minted for this deposit.
    pub scaled: u128,
}

/// Supplies escrowed tokens to the lending pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YieldCustody {
    positions: BTreeMap<u64, YieldPosition>,
}

impl YieldCustody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, id: u64) -> Option<&YieldPosition> {
        self.positions.get(&id)
    }

    /// Current claim of escrow `id` in underlying units.
    pub fn claim_of(&self, chain: &Chain, id: u64) -> Option<Amount> {
        let position = self.positions.get(&id)?;
        let reserve = chain.pool.as_ref()?.reserve(&position.token).ok()?;
        mul_div(position.scaled, reserve.liquidity_index(), WAD)
    }
}

impl Custody for YieldCustody {
    fn kind(&self) -> CustodyKind {
        CustodyKind::Yield
    }

    fn supports(&self, chain: &Chain, asset: &Asset) -> bool {
        match asset {
            Asset::Native => false,
            Asset::Token(token) => {
                chain.bank.is_registered(token)
                    && chain.pool.as_ref().is_some_and(|pool| pool.supports(token))
            }
        }
    }

    fn deposit(
        &mut self,
        chain: &mut Chain,
        ctx: &CustodyContext,
        id: u64,
        asset: &Asset,
        amount: Amount,
        from: Address,
    ) -> Result<(), EscrowError> {
        let token = match asset {
            Asset::Native => return Err(EscrowError::TokenNotSupported(Address::ZERO)),
            Asset::Token(token) => *token,
        };
        let (pool, bank) = chain
            .pool_and_bank_mut()
            .ok_or(EscrowError::TokenNotSupported(token))?;
        if !pool.supports(&token) {
            return Err(EscrowError::TokenNotSupported(token));
        }
        let pool_addr = pool.address();

        let erc20 = bank
            .token_mut(&token)
            .map_err(|_| EscrowError::TokenNotSupported(token))?;
        erc20
            .transfer_from(ctx.contract, from, ctx.contract, amount)
            .map_err(|e| EscrowError::from_deposit_failure(e, amount))?;
        erc20.approve(ctx.contract, pool_addr, amount)?;

        let scaled = pool.supply(bank, token, amount, ctx.contract, ctx.contract)?;
        tracing::debug!(id, token = %token, amount, scaled, "escrow funds supplied to pool");
        self.positions.insert(
            id,
            YieldPosition {
                token,
                principal: amount,
                scaled,
            },
        );
        Ok(())
    }

    fn release(
        &mut self,
        chain: &mut Chain,
        ctx: &CustodyContext,
        id: u64,
        asset: &Asset,
        amount: Amount,
        to: Address,
    ) -> Result<Amount, EscrowError> {
        let withdraw_error = |token: Address, principal: Amount| EscrowError::ErrorWithdrawFromPool {
            token,
            amount: principal,
            to,
        };
        let position = self
            .positions
            .get(&id)
            .cloned()
            .ok_or_else(|| withdraw_error(asset.token_addr(), amount))?;
        let failed = withdraw_error(position.token, position.principal);

        let (pool, bank) = chain.pool_and_bank_mut().ok_or_else(|| failed.clone())?;
        let paid = pool
            .withdraw_scaled(bank, position.token, position.scaled, ctx.contract, ctx.contract)
            .map_err(|e| {
                tracing::warn!(id, error = %e, "pool withdrawal failed");
                failed.clone()
            })?;
        if paid < position.principal {
            tracing::warn!(
                id,
                paid,
                principal = position.principal,
                "pool position worth less than escrowed principal"
            );
            return Err(failed);
        }

        bank.token_mut(&position.token)?
            .transfer(ctx.contract, to, paid)?;
        self.positions.remove(&id);
        tracing::debug!(id, paid, yield_earned = paid - position.principal, "escrow funds withdrawn from pool");
        Ok(paid)
    }

    fn held_balance(&self, chain: &Chain, asset: &Asset, holder: &Address) -> Amount {
        match (asset, chain.pool.as_ref()) {
            (Asset::Token(token), Some(pool)) => pool.a_token_balance_of(token, holder),
            _ => 0,
        }
    }

    fn holds_funds_in_contract(&self) -> bool {
        false
    }
}
