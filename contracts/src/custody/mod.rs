//! # Custody Adapters
//!
//! Where escrowed funds sit between `create` and the terminal transition.
//!
//! ```text
//!   depositor ──deposit──► [ custody ] ──release──► beneficiary / initiator
//! ```
//!
//! Two adapters implement [`Custody`]:
//!
//! - [`DirectCustody`]: funds sit in the contract's own balance.
//! - [`YieldCustody`]: token funds are supplied to the lending pool and earn
//!   interest until release.
//!
//! The contract stores a [`CustodyAdapter`], picked at deployment, and never
//! branches on the variant itself.

mod direct;
mod yield_pool;

pub use direct::DirectCustody;
pub use yield_pool::{YieldCustody, YieldPosition};

use escrow_protocol::{Address, Amount, Asset, Chain};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EscrowError;

/// Call-scoped facts a custody adapter needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustodyContext {
    /// The contract's own account.
    pub contract: Address,
    /// Native value the caller attached, already credited to `contract`.
    pub value: Amount,
}

/// Moves escrowed funds in and out of custody.
///
/// Implementations must leave the chain untouched when they return an
/// error, or rely on the caller's atomic section to roll it back. They
/// never retry.
pub trait Custody {
    fn kind(&self) -> CustodyKind;

    /// Whether deposits in `asset` are accepted at all.
    fn supports(&self, chain: &Chain, asset: &Asset) -> bool;

    /// Takes `amount` of `asset` from `from` into custody for escrow `id`.
    ///
    /// # Errors
    ///
    /// [`EscrowError::InsufficientBalance`] when the depositor cannot cover
    /// the amount, [`EscrowError::TokenNotSupported`] for unsupported assets.
    fn deposit(
        &mut self,
        chain: &mut Chain,
        ctx: &CustodyContext,
        id: u64,
        asset: &Asset,
        amount: Amount,
        from: Address,
    ) -> Result<(), EscrowError>;

    /// Pays escrow `id` out to `to` and returns the amount paid, which is
    /// never less than `amount`.
    fn release(
        &mut self,
        chain: &mut Chain,
        ctx: &CustodyContext,
        id: u64,
        asset: &Asset,
        amount: Amount,
        to: Address,
    ) -> Result<Amount, EscrowError>;

    /// What custody holds in `asset` for `holder`.
    fn held_balance(&self, chain: &Chain, asset: &Asset, holder: &Address) -> Amount;

    /// Whether active escrow funds sit in the contract's own balance. When
    /// they do, that part of the balance is not rescuable.
    fn holds_funds_in_contract(&self) -> bool;
}

/// Which adapter a contract was deployed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustodyKind {
    Direct,
    Yield,
}

impl fmt::Display for CustodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustodyKind::Direct => write!(f, "direct"),
            CustodyKind::Yield => write!(f, "yield"),
        }
    }
}

impl FromStr for CustodyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(CustodyKind::Direct),
            "yield" => Ok(CustodyKind::Yield),
            other => Err(format!("unknown custody kind: {}", other)),
        }
    }
}

/// The adapter a contract owns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CustodyAdapter {
    Direct(DirectCustody),
    Yield(YieldCustody),
}

impl CustodyAdapter {
    pub fn new(kind: CustodyKind) -> Self {
        match kind {
            CustodyKind::Direct => CustodyAdapter::Direct(DirectCustody::new()),
            CustodyKind::Yield => CustodyAdapter::Yield(YieldCustody::new()),
        }
    }

    fn inner(&self) -> &dyn Custody {
        match self {
            CustodyAdapter::Direct(c) => c,
            CustodyAdapter::Yield(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Custody {
        match self {
            CustodyAdapter::Direct(c) => c,
            CustodyAdapter::Yield(c) => c,
        }
    }
}

impl Custody for CustodyAdapter {
    fn kind(&self) -> CustodyKind {
        self.inner().kind()
    }

    fn supports(&self, chain: &Chain, asset: &Asset) -> bool {
        self.inner().supports(chain, asset)
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
        self.inner_mut().deposit(chain, ctx, id, asset, amount, from)
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
        self.inner_mut().release(chain, ctx, id, asset, amount, to)
    }

    fn held_balance(&self, chain: &Chain, asset: &Asset, holder: &Address) -> Amount {
        self.inner().held_balance(chain, asset, holder)
    }

    fn holds_funds_in_contract(&self) -> bool {
        self.inner().holds_funds_in_contract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Direct".parse::<CustodyKind>().unwrap(), CustodyKind::Direct);
        assert_eq!("yield".parse::<CustodyKind>().unwrap(), CustodyKind::Yield);
        assert!("vault".parse::<CustodyKind>().is_err());
    }

    #[test]
    fn adapter_reports_its_kind() {
        assert_eq!(CustodyAdapter::new(CustodyKind::Direct).kind(), CustodyKind::Direct);
        let y = CustodyAdapter::new(CustodyKind::Yield);
        assert_eq!(y.kind(), CustodyKind::Yield);
        assert!(!y.holds_funds_in_contract());
    }
}
