//! # Escrow Contract
//!
//! Two-party escrow with time-locked release and a dispute path:
//!
//! - **Ledger**: every escrow record, a per-initiator index, and the
//!   one-active-escrow-per-pair rule.
//! - **State machine**: `Created → {Approved, Canceled, Dispute}`,
//!   `Dispute → {Approved, Canceled}`, with caller and unlock-time guards.
//! - **Custody**: funds sit in the contract ([`DirectCustody`]) or are
//!   supplied to the lending pool to earn yield ([`YieldCustody`]).
//! - **Admin**: owner, pause switch, rescue of idle funds.
//!
//! ## Design Principles
//!
//! 1. A call either completes or leaves no trace: ledger, custody, events
//!    and balances are restored on any error.
//! 2. Status is written before funds move, and fund-moving calls hold the
//!    reentrancy lock.
//! 3. Errors carry the ABI name clients match on ([`EscrowError::name`]).
//! 4. Every public type is serializable (serde) for the node API and the
//!    on-disk snapshot.

pub mod admin;
pub mod call;
pub mod contract;
pub mod custody;
pub mod error;
pub mod escrow;
pub mod events;
pub mod guard;
pub mod ledger;
pub mod transitions;

pub use admin::AdminContext;
pub use call::{Call, CallError, CallReceipt, SignedCall};
pub use contract::{CallContext, EscrowContract};
pub use custody::{Custody, CustodyAdapter, CustodyKind, DirectCustody, YieldCustody};
pub use error::EscrowError;
pub use escrow::{EscrowStatus, EscrowTransaction};
pub use events::{EscrowEvent, LoggedEvent};
pub use ledger::EscrowLedger;
pub use transitions::Transition;
