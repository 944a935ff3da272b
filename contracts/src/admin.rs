//! # Admin Context
//!
//! Ownership and the pause switch, as one explicit value the contract
//! consults instead of scattered globals.
//!
//! The owner may pause and unpause the contract, rescue idle assets while
//! paused, and hand over or renounce ownership. Once renounced, every
//! owner-only call fails with [`EscrowError::OwnableUnauthorizedAccount`].

use escrow_protocol::Address;
use serde::{Deserialize, Serialize};

use crate::error::EscrowError;

/// Owner and pause state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminContext {
    owner: Option<Address>,
    paused: bool,
}

impl AdminContext {
    /// A context owned by `owner`, unpaused.
    ///
    /// # Errors
    ///
    /// [`EscrowError::OwnableInvalidOwner`] for the zero address.
    pub fn new(owner: Address) -> Result<Self, EscrowError> {
        if owner.is_zero() {
            return Err(EscrowError::OwnableInvalidOwner(owner));
        }
        Ok(Self {
            owner: Some(owner),
            paused: false,
        })
    }

    /// The owner, or the zero address once renounced.
    pub fn owner(&self) -> Address {
        self.owner.unwrap_or(Address::ZERO)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn require_owner(&self, caller: &Address) -> Result<(), EscrowError> {
        match self.owner {
            Some(owner) if owner == *caller => Ok(()),
            _ => Err(EscrowError::OwnableUnauthorizedAccount(*caller)),
        }
    }

    pub fn require_not_paused(&self) -> Result<(), EscrowError> {
        if self.paused {
            return Err(EscrowError::EnforcedPause);
        }
        Ok(())
    }

    pub fn require_paused(&self) -> Result<(), EscrowError> {
        if !self.paused {
            return Err(EscrowError::ExpectedPause);
        }
        Ok(())
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), EscrowError> {
        self.require_owner(caller)?;
        self.require_not_paused()?;
        self.paused = true;
        Ok(())
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), EscrowError> {
        self.require_owner(caller)?;
        self.require_paused()?;
        self.paused = false;
        Ok(())
    }

    /// Hands ownership to `new_owner`. Returns the previous owner.
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<Address, EscrowError> {
        self.require_owner(caller)?;
        if new_owner.is_zero() {
            return Err(EscrowError::OwnableInvalidOwner(new_owner));
        }
        let previous = self.owner();
        self.owner = Some(new_owner);
        Ok(previous)
    }

    /// Leaves the contract without an owner. Returns the previous owner.
    pub fn renounce_ownership(&mut self, caller: &Address) -> Result<Address, EscrowError> {
        self.require_owner(caller)?;
        let previous = self.owner();
        self.owner = None;
        Ok(previous)
    }
}
