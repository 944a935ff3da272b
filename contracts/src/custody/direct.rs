//! Direct custody: escrowed funds sit in the contract's own balance.
//!
//! Native deposits arrive as value attached to the create call and must
//! match the escrowed amount exactly. Token deposits are pulled with
//! `transfer_from`, so the depositor approves the contract first.

use escrow_protocol::{Address, Amount, Asset, Chain, TokenError};
use serde::{Deserialize, Serialize};

use super::{Custody, CustodyContext, CustodyKind};
use crate::error::EscrowError;

/// Holds funds in the contract account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectCustody;

impl DirectCustody {
    pub fn new() -> Self {
        Self
    }
}

impl Custody for DirectCustody {
    fn kind(&self) -> CustodyKind {
        CustodyKind::Direct
    }

    fn supports(&self, chain: &Chain, asset: &Asset) -> bool {
        match asset {
            Asset::Native => true,
            Asset::Token(token) => chain.bank.is_registered(token),
        }
    }

    fn deposit(
        &mut self,
        chain: &mut Chain,
        ctx: &CustodyContext,
        _id: u64,
        asset: &Asset,
        amount: Amount,
        from: Address,
    ) -> Result<(), EscrowError> {
        match asset {
            Asset::Native => {
                if ctx.value < amount {
                    return Err(EscrowError::InsufficientBalance(amount));
                }
                if ctx.value > amount {
                    return Err(EscrowError::UnexpectedNativeValue(ctx.value));
                }
                Ok(())
            }
            Asset::Token(token) => {
                let erc20 = chain
                    .bank
                    .token_mut(token)
                    .map_err(|_| EscrowError::TokenNotSupported(*token))?;
                erc20
                    .transfer_from(ctx.contract, from, ctx.contract, amount)
                    .map_err(|e| EscrowError::from_deposit_failure(e, amount))
            }
        }
    }

    fn release(
        &mut self,
        chain: &mut Chain,
        ctx: &CustodyContext,
        _id: u64,
        asset: &Asset,
        amount: Amount,
        to: Address,
    ) -> Result<Amount, EscrowError> {
        chain
            .bank
            .transfer(asset, ctx.contract, to, amount)
            .map_err(|e| match e {
                TokenError::InsufficientBalance { .. } => EscrowError::InsufficientBalance(amount),
                other => EscrowError::Token(other),
            })?;
        Ok(amount)
    }

    fn held_balance(&self, chain: &Chain, asset: &Asset, holder: &Address) -> Amount {
        chain.bank.balance_of(asset, holder).unwrap_or(0)
    }

    fn holds_funds_in_contract(&self) -> bool {
        true
    }
}
