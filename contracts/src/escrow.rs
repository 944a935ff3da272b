//! # Escrow Transactions
//!
//! The record stored per escrow and its lifecycle status.
//!
//! ```text
//!            ┌──────────► Approved
//!            │               ▲
//!  Created ──┼──► Dispute ───┤
//!            │               ▼
//!            └──────────► Canceled
//! ```
//!
//! `Approved` and `Canceled` are terminal. Only `status` changes after a
//! record is created.

use escrow_protocol::amount::as_decimal_str;
use escrow_protocol::{Address, Amount, Asset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an escrow transaction.
///
/// Serialized as its ABI ordinal (`Created = 0` .. `Dispute = 3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum EscrowStatus {
    Created = 0,
    Approved = 1,
    Canceled = 2,
    Dispute = 3,
}

impl EscrowStatus {
    /// `Created` or `Dispute`: funds are still in custody.
    pub fn is_active(self) -> bool {
        matches!(self, EscrowStatus::Created | EscrowStatus::Dispute)
    }

    /// `Approved` or `Canceled`: no transition leaves these.
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl From<EscrowStatus> for u8 {
    fn from(status: EscrowStatus) -> u8 {
        status as u8
    }
}

impl TryFrom<u8> for EscrowStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EscrowStatus::Created),
            1 => Ok(EscrowStatus::Approved),
            2 => Ok(EscrowStatus::Canceled),
            3 => Ok(EscrowStatus::Dispute),
            other => Err(format!("invalid escrow status ordinal: {}", other)),
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscrowStatus::Created => write!(f, "Created"),
            EscrowStatus::Approved => write!(f, "Approved"),
            EscrowStatus::Canceled => write!(f, "Canceled"),
            EscrowStatus::Dispute => write!(f, "Dispute"),
        }
    }
}

/// One escrow between an initiator and a beneficiary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowTransaction {
    /// 1-based sequential id. 0 is never assigned.
    pub id: u64,
    /// The account that created and funded the escrow.
    pub initiator: Address,
    /// The account paid on approval.
    pub beneficiary: Address,
    /// ABI token address; zero for the native currency.
    pub token_addr: Address,
    #[serde(with = "as_decimal_str")]
    pub token_amount: Amount,
    /// Unix seconds from which approval is allowed (inclusive).
    pub unlock_time: u64,
    pub status: EscrowStatus,
}

impl EscrowTransaction {
    /// The asset the escrow is denominated in, resolved from `token_addr`.
    pub fn asset(&self) -> Asset {
        Asset::from_token_addr(self.token_addr)
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_unlocked(&self, now: u64) -> bool {
        now >= self.unlock_time
    }
}

/// Parameters for a new escrow, before an id is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewEscrow {
    pub initiator: Address,
    pub beneficiary: Address,
    pub asset: Asset,
    pub token_amount: Amount,
    pub unlock_time: u64,
}
