//! # Escrow Ledger
//!
//! Append-only storage of every escrow record plus the two derived indices:
//!
//! - **user index**: initiator → ids it created, in creation order. Never
//!   shrinks; an account that re-initiates appears once per escrow.
//! - **active-pair index**: `(initiator, beneficiary)` → id of the active
//!   escrow for that ordered pair.
//!
//! The ledger owns the one-active-escrow-per-pair invariant: [`EscrowLedger::insert`]
//! refuses a second active entry and [`EscrowLedger::set_status`] releases
//! the pair when a record reaches a terminal status. It does not validate
//! transitions; that is [`crate::transitions`]' job.

use escrow_protocol::{Address, Amount, Asset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EscrowError;
use crate::escrow::{EscrowStatus, EscrowTransaction, NewEscrow};

/// The escrow ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscrowLedger {
    /// `records[i]` has id `i + 1`.
    records: Vec<EscrowTransaction>,
    user_index: BTreeMap<Address, Vec<u64>>,
    /// `initiator -> (beneficiary -> active id)`.
    active_pairs: BTreeMap<Address, BTreeMap<Address, u64>>,
}

impl EscrowLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of escrows ever created; also the id of the latest one.
    pub fn counter(&self) -> u64 {
        self.records.len() as u64
    }

    /// Stores a new escrow in `Created` status and returns its id.
    ///
    /// # Errors
    ///
    /// [`EscrowError::AlreadyActiveEscrowTx`] if the pair already has an
    /// active escrow.
    pub fn insert(&mut self, new: NewEscrow) -> Result<u64, EscrowError> {
        let active = self.active_for(&new.initiator, &new.beneficiary);
        if active != 0 {
            return Err(EscrowError::AlreadyActiveEscrowTx {
                id: active,
                initiator: new.initiator,
                beneficiary: new.beneficiary,
            });
        }

        let id = self.counter() + 1;
        self.records.push(EscrowTransaction {
            id,
            initiator: new.initiator,
            beneficiary: new.beneficiary,
            token_addr: new.asset.token_addr(),
            token_amount: new.token_amount,
            unlock_time: new.unlock_time,
            status: EscrowStatus::Created,
        });
        self.user_index.entry(new.initiator).or_default().push(id);
        self.active_pairs
            .entry(new.initiator)
            .or_default()
            .insert(new.beneficiary, id);
        Ok(id)
    }

    /// Fetches a record.
    ///
    /// # Errors
    ///
    /// [`EscrowError::EscrowTxNotFound`] for id 0 or ids past the counter.
    pub fn get(&self, id: u64) -> Result<&EscrowTransaction, EscrowError> {
        id.checked_sub(1)
            .and_then(|idx| self.records.get(idx as usize))
            .ok_or(EscrowError::EscrowTxNotFound(id))
    }

    /// Overwrites the status of `id`. Clears the active pair when `status`
    /// is terminal.
    pub fn set_status(&mut self, id: u64, status: EscrowStatus) -> Result<(), EscrowError> {
        let record = id
            .checked_sub(1)
            .and_then(|idx| self.records.get_mut(idx as usize))
            .ok_or(EscrowError::EscrowTxNotFound(id))?;
        record.status = status;

        if status.is_terminal() {
            let (initiator, beneficiary) = (record.initiator, record.beneficiary);
            if let Some(by_beneficiary) = self.active_pairs.get_mut(&initiator) {
                if by_beneficiary.get(&beneficiary) == Some(&id) {
                    by_beneficiary.remove(&beneficiary);
                }
                if by_beneficiary.is_empty() {
                    self.active_pairs.remove(&initiator);
                }
            }
        }
        Ok(())
    }

    /// All records in creation order.
    pub fn list_all(&self) -> &[EscrowTransaction] {
        &self.records
    }

    /// Ids initiated by `account`, in creation order.
    pub fn list_by_user(&self, account: &Address) -> &[u64] {
        self.user_index
            .get(account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Id of the active escrow for the ordered pair, or 0.
    pub fn active_for(&self, initiator: &Address, beneficiary: &Address) -> u64 {
        self.active_pairs
            .get(initiator)
            .and_then(|m| m.get(beneficiary))
            .copied()
            .unwrap_or(0)
    }

    pub fn active(&self) -> impl Iterator<Item = &EscrowTransaction> {
        self.records.iter().filter(|r| r.is_active())
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    /// Σ `token_amount` over active escrows in `asset`.
    pub fn locked_amount(&self, asset: &Asset) -> Amount {
        self.active()
            .filter(|r| r.asset() == *asset)
            .fold(0, |acc: Amount, r| acc.saturating_add(r.token_amount))
    }
}
