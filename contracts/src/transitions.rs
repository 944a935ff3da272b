//! # Transition Guards
//!
//! The legal moves of the escrow state machine and who may make them.
//!
//! | Transition              | From     | To       | Caller                   | Time            |
//! |-------------------------|----------|----------|--------------------------|-----------------|
//! | `Approve`               | Created  | Approved | initiator                | `now >= unlock` |
//! | `Cancel`                | Created  | Canceled | initiator                | none            |
//! | `Dispute`               | Created  | Dispute  | initiator or beneficiary | none            |
//! | `CloseDisputeApprove`   | Dispute  | Approved | initiator                | `now >= unlock` |
//! | `CloseDisputeCancel`    | Dispute  | Canceled | initiator                | none            |
//!
//! Checks run in a fixed order: caller, then status, then time. The first
//! failing check decides the error.

use escrow_protocol::Address;

use crate::error::EscrowError;
use crate::escrow::{EscrowStatus, EscrowTransaction};

/// A status-changing operation on an existing escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Approve,
    Cancel,
    Dispute,
    CloseDisputeApprove,
    CloseDisputeCancel,
}

/// Who may perform a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRule {
    InitiatorOnly,
    EitherParty,
}

impl Transition {
    /// The only status this transition may start from.
    pub fn source(self) -> EscrowStatus {
        match self {
            Transition::Approve | Transition::Cancel | Transition::Dispute => EscrowStatus::Created,
            Transition::CloseDisputeApprove | Transition::CloseDisputeCancel => EscrowStatus::Dispute,
        }
    }

    pub fn target(self) -> EscrowStatus {
        match self {
            Transition::Approve | Transition::CloseDisputeApprove => EscrowStatus::Approved,
            Transition::Cancel | Transition::CloseDisputeCancel => EscrowStatus::Canceled,
            Transition::Dispute => EscrowStatus::Dispute,
        }
    }

    pub fn caller_rule(self) -> CallerRule {
        match self {
            Transition::Dispute => CallerRule::EitherParty,
            _ => CallerRule::InitiatorOnly,
        }
    }

    /// Whether the escrow's unlock time must have passed.
    pub fn is_time_locked(self) -> bool {
        matches!(self, Transition::Approve | Transition::CloseDisputeApprove)
    }

    /// Whether the transition pays out to the beneficiary.
    pub fn pays_beneficiary(self) -> bool {
        self.target() == EscrowStatus::Approved
    }

    /// Whether funds move at all.
    pub fn moves_funds(self) -> bool {
        self.target().is_terminal()
    }

    /// Validates `caller` moving `tx` along this transition at time `now`.
    ///
    /// # Errors
    ///
    /// - [`EscrowError::OnlyEscrowTxInitiatorAllowed`] /
    ///   [`EscrowError::OnlyEscrowTxPartiesAllowed`] for the wrong caller.
    /// - [`EscrowError::IncorrectEscrowTxStatus`] with the current status.
    /// - [`EscrowError::UnlockTimeNotReached`] before the unlock time.
    pub fn check(self, tx: &EscrowTransaction, caller: &Address, now: u64) -> Result<(), EscrowError> {
        match self.caller_rule() {
            CallerRule::InitiatorOnly if *caller != tx.initiator => {
                return Err(EscrowError::OnlyEscrowTxInitiatorAllowed);
            }
            CallerRule::EitherParty if *caller != tx.initiator && *caller != tx.beneficiary => {
                return Err(EscrowError::OnlyEscrowTxPartiesAllowed);
            }
            _ => {}
        }

        if tx.status != self.source() {
            return Err(EscrowError::IncorrectEscrowTxStatus(tx.status));
        }

        if self.is_time_locked() && !tx.is_unlocked(now) {
            return Err(EscrowError::UnlockTimeNotReached {
                now,
                unlock_time: tx.unlock_time,
            });
        }
        Ok(())
    }
}
