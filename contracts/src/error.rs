//! # Escrow Errors
//!
//! One flat enum for every way an escrow call can fail. Each variant carries
//! the values a client needs to explain the failure, and [`EscrowError::name`]
//! gives the stable ABI-style identifier clients switch on.

use escrow_protocol::{Address, Amount, PoolError, TokenError};
use thiserror::Error;

use crate::escrow::EscrowStatus;

/// Errors returned by the escrow contract.
///
/// Any error aborts the call that produced it with no partial state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    /// A beneficiary, recipient, or owner argument was the zero address.
    #[error("zero address not allowed")]
    ZeroAddressNotAllowed,

    /// The `(initiator, beneficiary)` pair already has an active escrow.
    #[error("escrow transaction {id} is already active between {initiator} and {beneficiary}")]
    AlreadyActiveEscrowTx {
        /// Id of the escrow currently holding the pair.
        id: u64,
        initiator: Address,
        beneficiary: Address,
    },

    /// The escrow's current status does not permit this transition.
    #[error("incorrect escrow transaction status: {0}")]
    IncorrectEscrowTxStatus(EscrowStatus),

    #[error("only the escrow transaction initiator is allowed")]
    OnlyEscrowTxInitiatorAllowed,

    /// Dispute opened by an account that is neither initiator nor beneficiary.
    #[error("only the escrow transaction parties are allowed")]
    OnlyEscrowTxPartiesAllowed,

    #[error("unlock time not reached: now {now}, unlocks at {unlock_time}")]
    UnlockTimeNotReached { now: u64, unlock_time: u64 },

    /// A deposit or payout could not be funded.
    #[error("insufficient balance: {0} required")]
    InsufficientBalance(Amount),

    #[error("token not supported: {0}")]
    TokenNotSupported(Address),

    /// The lending pool failed to return at least the escrowed principal.
    #[error("error withdrawing {amount} of {token} from pool to {to}")]
    ErrorWithdrawFromPool {
        token: Address,
        amount: Amount,
        to: Address,
    },

    #[error("contract is paused")]
    EnforcedPause,

    #[error("contract is not paused")]
    ExpectedPause,

    #[error("account {0} is not the owner")]
    OwnableUnauthorizedAccount(Address),

    #[error("invalid owner: {0}")]
    OwnableInvalidOwner(Address),

    #[error("reentrant call")]
    ReentrancyGuardReentrantCall,

    #[error("escrow transaction {0} not found")]
    EscrowTxNotFound(u64),

    #[error("amount must be greater than zero")]
    ZeroAmountNotAllowed,

    /// Native value attached to a call that does not accept it, or more value
    /// than the escrowed amount.
    #[error("unexpected native value attached: {0}")]
    UnexpectedNativeValue(Amount),

    #[error("amount overflow")]
    AmountOverflow,

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
}

impl EscrowError {
    /// The ABI-style error name, stable across releases.
    pub fn name(&self) -> &'static str {
        match self {
            EscrowError::ZeroAddressNotAllowed => "ZeroAddressNotAllowed",
            EscrowError::AlreadyActiveEscrowTx { .. } => "AlreadyActiveEscrowTx",
            EscrowError::IncorrectEscrowTxStatus(_) => "IncorrectEscrowTxStatus",
            EscrowError::OnlyEscrowTxInitiatorAllowed => "OnlyEscrowTxInitiatorAllowed",
            EscrowError::OnlyEscrowTxPartiesAllowed => "OnlyEscrowTxPartiesAllowed",
            EscrowError::UnlockTimeNotReached { .. } => "UnlockTimeNotReached",
            EscrowError::InsufficientBalance(_) => "InsufficientBalance",
            EscrowError::TokenNotSupported(_) => "TokenNotSupported",
            EscrowError::ErrorWithdrawFromPool { .. } => "ErrorWithdrawFromPool",
            EscrowError::EnforcedPause => "EnforcedPause",
            EscrowError::ExpectedPause => "ExpectedPause",
            EscrowError::OwnableUnauthorizedAccount(_) => "OwnableUnauthorizedAccount",
            EscrowError::OwnableInvalidOwner(_) => "OwnableInvalidOwner",
            EscrowError::ReentrancyGuardReentrantCall => "ReentrancyGuardReentrantCall",
            EscrowError::EscrowTxNotFound(_) => "EscrowTxNotFound",
            EscrowError::ZeroAmountNotAllowed => "ZeroAmountNotAllowed",
            EscrowError::UnexpectedNativeValue(_) => "UnexpectedNativeValue",
            EscrowError::AmountOverflow => "AmountOverflow",
            EscrowError::Token(_) => "TokenError",
            EscrowError::Pool(_) => "PoolError",
        }
    }

    /// Maps a failed pull of funds from a depositor: a short allowance or
    /// balance both surface as [`EscrowError::InsufficientBalance`].
    pub(crate) fn from_deposit_failure(err: TokenError, required: Amount) -> Self {
        match err {
            TokenError::InsufficientBalance { .. } | TokenError::InsufficientAllowance { .. } => {
                EscrowError::InsufficientBalance(required)
            }
            other => EscrowError::Token(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_abi() {
        assert_eq!(EscrowError::EnforcedPause.name(), "EnforcedPause");
        assert_eq!(
            EscrowError::UnlockTimeNotReached { now: 1, unlock_time: 2 }.name(),
            "UnlockTimeNotReached"
        );
        assert_eq!(
            EscrowError::IncorrectEscrowTxStatus(EscrowStatus::Approved).name(),
            "IncorrectEscrowTxStatus"
        );
    }

    #[test]
    fn deposit_failures_collapse_to_insufficient_balance() {
        let token = Address::from_label("token:DAI");
        let who = Address::from_label("alice");
        let err = EscrowError::from_deposit_failure(
            TokenError::InsufficientAllowance {
                token,
                owner: who,
                spender: who,
                allowance: 0,
                required: 5,
            },
            5,
        );
        assert_eq!(err, EscrowError::InsufficientBalance(5));

        let err = EscrowError::from_deposit_failure(TokenError::UnknownToken(token), 5);
        assert_eq!(err.name(), "TokenError");
    }

    #[test]
    fn display_is_short_reason() {
        let msg = EscrowError::UnlockTimeNotReached { now: 10, unlock_time: 70 }.to_string();
        assert_eq!(msg, "unlock time not reached: now 10, unlocks at 70");
        assert_eq!(
            EscrowError::InsufficientBalance(300).to_string(),
            "insufficient balance: 300 required"
        );
    }
}
