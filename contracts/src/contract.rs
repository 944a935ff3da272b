//! # Escrow Contract
//!
//! The contract ties the pieces together:
//!
//! ```text
//! call ──► pause gate ──► reentrancy lock ──► transition guard
//!      ──► ledger update ──► custody adapter ──► event log
//! ```
//!
//! Every mutating call runs inside an atomic section. The ledger, custody
//! state, admin state, event log and the whole [`Chain`] are snapshotted
//! first and restored if any step fails, so a failed call leaves no trace.
//!
//! Ledger status is written before custody moves any funds, and fund-moving
//! calls hold the [`ReentrancyGuard`] for their whole duration.

use escrow_protocol::{AccountData, Address, Amount, Asset, Chain};
use serde::{Deserialize, Serialize};

use crate::admin::AdminContext;
use crate::custody::{Custody, CustodyAdapter, CustodyContext, CustodyKind};
use crate::error::EscrowError;
use crate::escrow::{EscrowTransaction, NewEscrow};
use crate::events::{EscrowEvent, LoggedEvent};
use crate::guard::ReentrancyGuard;
use crate::ledger::EscrowLedger;
use crate::transitions::Transition;

/// Who is calling and how much native value they attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub value: Amount,
}

impl CallContext {
    /// A call with no value attached.
    pub fn new(caller: Address) -> Self {
        Self { caller, value: 0 }
    }

    pub fn with_value(caller: Address, value: Amount) -> Self {
        Self { caller, value }
    }
}

/// One deployed escrow contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowContract {
    address: Address,
    admin: AdminContext,
    ledger: EscrowLedger,
    custody: CustodyAdapter,
    events: Vec<LoggedEvent>,
    #[serde(skip)]
    guard: ReentrancyGuard,
}

impl EscrowContract {
    /// Deploys a contract at `address` owned by `owner`.
    ///
    /// # Errors
    ///
    /// [`EscrowError::OwnableInvalidOwner`] for a zero owner,
    /// [`EscrowError::ZeroAddressNotAllowed`] for a zero contract address.
    pub fn deploy(address: Address, owner: Address, custody: CustodyKind) -> Result<Self, EscrowError> {
        if address.is_zero() {
            return Err(EscrowError::ZeroAddressNotAllowed);
        }
        let admin = AdminContext::new(owner)?;
        tracing::info!(contract = %address, owner = %owner, custody = %custody, "escrow contract deployed");
        Ok(Self {
            address,
            admin,
            ledger: EscrowLedger::new(),
            custody: CustodyAdapter::new(custody),
            events: Vec::new(),
            guard: ReentrancyGuard::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn custody(&self) -> &CustodyAdapter {
        &self.custody
    }

    pub fn custody_kind(&self) -> CustodyKind {
        self.custody.kind()
    }

    pub fn ledger(&self) -> &EscrowLedger {
        &self.ledger
    }

    pub fn admin(&self) -> &AdminContext {
        &self.admin
    }

    pub fn reentrancy_guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    pub fn owner(&self) -> Address {
        self.admin.owner()
    }

    pub fn paused(&self) -> bool {
        self.admin.is_paused()
    }

    pub fn get_escrow_transaction(&self, id: u64) -> Result<&EscrowTransaction, EscrowError> {
        self.ledger.get(id)
    }

    pub fn get_all_escrows_tx(&self) -> &[EscrowTransaction] {
        self.ledger.list_all()
    }

    pub fn get_user_escrows(&self, account: &Address) -> &[u64] {
        self.ledger.list_by_user(account)
    }

    /// Id of the active escrow from `initiator` to `beneficiary`, or 0.
    pub fn get_active_escrow_transaction(&self, initiator: &Address, beneficiary: &Address) -> u64 {
        self.ledger.active_for(initiator, beneficiary)
    }

    pub fn counter_escrow_transactions(&self) -> u64 {
        self.ledger.counter()
    }

    /// Native balance held by the contract account.
    pub fn get_contract_ether_balance(&self, chain: &Chain) -> Amount {
        chain.bank.native_balance_of(&self.address)
    }

    /// Token balance held by the contract account.
    ///
    /// # Errors
    ///
    /// [`EscrowError::ZeroAddressNotAllowed`] for the zero address (use
    /// [`Self::get_contract_ether_balance`]), [`EscrowError::TokenNotSupported`]
    /// for unregistered tokens.
    pub fn get_contract_balance_of(&self, chain: &Chain, token: &Address) -> Result<Amount, EscrowError> {
        if token.is_zero() {
            return Err(EscrowError::ZeroAddressNotAllowed);
        }
        chain
            .bank
            .token(token)
            .map(|t| t.balance_of(&self.address))
            .map_err(|_| EscrowError::TokenNotSupported(*token))
    }

    /// The contract's interest-bearing pool position in `token`.
    pub fn get_contract_atoken_balance_of(&self, chain: &Chain, token: &Address) -> Amount {
        chain
            .pool
            .as_ref()
            .map(|pool| pool.a_token_balance_of(token, &self.address))
            .unwrap_or(0)
    }

    /// Pool account summary for `user`; `None` when the chain has no pool.
    pub fn get_user_account_data(&self, chain: &Chain, user: &Address) -> Option<AccountData> {
        chain.pool.as_ref().map(|pool| pool.user_account_data(user))
    }

    /// The lending pool the contract supplies to, if any.
    pub fn pool_address(&self, chain: &Chain) -> Option<Address> {
        chain.pool.as_ref().map(|pool| pool.address())
    }

    /// Σ of active escrow amounts in `asset`.
    pub fn locked_amount(&self, asset: &Asset) -> Amount {
        self.ledger.locked_amount(asset)
    }

    pub fn events(&self) -> &[LoggedEvent] {
        &self.events
    }

    /// Events with `index >= since`.
    pub fn events_since(&self, since: u64) -> &[LoggedEvent] {
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(self.events.len());
        &self.events[start..]
    }

    // -----------------------------------------------------------------------
    // Escrow lifecycle
    // -----------------------------------------------------------------------

    /// Creates an escrow from the caller to `beneficiary` and takes the funds
    /// into custody. A zero `token_addr` escrows native value, which must be
    /// attached to the call in full.
    ///
    /// Returns the new escrow id.
    pub fn create_escrow_transaction(
        &mut self,
        chain: &mut Chain,
        ctx: &CallContext,
        beneficiary: Address,
        token_addr: Address,
        token_amount: Amount,
        unlock_time: u64,
    ) -> Result<u64, EscrowError> {
        self.admin.require_not_paused()?;
        self.atomic(chain, |this, chain| {
            let _lock = this.guard.enter()?;

            if beneficiary.is_zero() {
                return Err(EscrowError::ZeroAddressNotAllowed);
            }
            if token_amount == 0 {
                return Err(EscrowError::ZeroAmountNotAllowed);
            }
            let asset = Asset::from_token_addr(token_addr);
            if !this.custody.supports(chain, &asset) {
                return Err(EscrowError::TokenNotSupported(token_addr));
            }
            if !asset.is_native() && ctx.value > 0 {
                return Err(EscrowError::UnexpectedNativeValue(ctx.value));
            }

            let id = this.ledger.insert(NewEscrow {
                initiator: ctx.caller,
                beneficiary,
                asset,
                token_amount,
                unlock_time,
            })?;

            this.collect_value(chain, ctx)?;
            let custody_ctx = this.custody_context(ctx.value);
            this.custody
                .deposit(chain, &custody_ctx, id, &asset, token_amount, ctx.caller)?;

            this.emit(
                chain,
                EscrowEvent::TransactionCreated {
                    beneficiary,
                    initiator: ctx.caller,
                    token_addr,
                    token_amount,
                    unlock_time,
                },
            );
            tracing::info!(
                id,
                initiator = %ctx.caller,
                beneficiary = %beneficiary,
                asset = %asset,
                amount = token_amount,
                unlock_time,
                "escrow transaction created"
            );
            Ok(id)
        })
    }

    /// Initiator releases the escrow to the beneficiary once unlocked.
    pub fn approve_escrow_transaction(&mut self, chain: &mut Chain, ctx: &CallContext, id: u64) -> Result<(), EscrowError> {
        self.transition(chain, ctx, id, Transition::Approve)
    }

    /// Initiator takes the escrow back. Allowed any time while `Created`.
    pub fn cancel_escrow_transaction(&mut self, chain: &mut Chain, ctx: &CallContext, id: u64) -> Result<(), EscrowError> {
        self.transition(chain, ctx, id, Transition::Cancel)
    }

    /// Either party freezes the escrow in `Dispute`. No funds move.
    pub fn initiate_dispute(&mut self, chain: &mut Chain, ctx: &CallContext, id: u64) -> Result<(), EscrowError> {
        self.transition(chain, ctx, id, Transition::Dispute)
    }

    /// Initiator resolves a dispute in the beneficiary's favour once unlocked.
    pub fn close_dispute_and_approve(&mut self, chain: &mut Chain, ctx: &CallContext, id: u64) -> Result<(), EscrowError> {
        self.transition(chain, ctx, id, Transition::CloseDisputeApprove)
    }

    /// Initiator resolves a dispute by refunding themselves.
    pub fn close_dispute_and_cancel(&mut self, chain: &mut Chain, ctx: &CallContext, id: u64) -> Result<(), EscrowError> {
        self.transition(chain, ctx, id, Transition::CloseDisputeCancel)
    }

    fn transition(
        &mut self,
        chain: &mut Chain,
        ctx: &CallContext,
        id: u64,
        transition: Transition,
    ) -> Result<(), EscrowError> {
        Self::reject_value(ctx)?;
        self.admin.require_not_paused()?;
        self.atomic(chain, |this, chain| {
            let _lock = this.guard.enter()?;

            let tx = this.ledger.get(id)?.clone();
            transition.check(&tx, &ctx.caller, chain.timestamp())?;
            this.ledger.set_status(id, transition.target())?;

            if transition.moves_funds() {
                let to = if transition.pays_beneficiary() {
                    tx.beneficiary
                } else {
                    tx.initiator
                };
                let custody_ctx = this.custody_context(0);
                let paid = this
                    .custody
                    .release(chain, &custody_ctx, id, &tx.asset(), tx.token_amount, to)?;
                tracing::debug!(id, to = %to, paid, "escrow funds released");
            }

            let event = match transition {
                Transition::Approve | Transition::CloseDisputeApprove => EscrowEvent::TransactionApproved { id },
                Transition::Cancel | Transition::CloseDisputeCancel => EscrowEvent::TransactionCanceled { id },
                Transition::Dispute => EscrowEvent::TransactionDisputed { id },
            };
            this.emit(chain, event);
            tracing::info!(
                id,
                caller = %ctx.caller,
                status = %transition.target(),
                "escrow transaction updated"
            );
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    pub fn pause(&mut self, chain: &Chain, ctx: &CallContext) -> Result<(), EscrowError> {
        Self::reject_value(ctx)?;
        self.admin.pause(&ctx.caller)?;
        self.emit(chain, EscrowEvent::Paused { account: ctx.caller });
        tracing::warn!(by = %ctx.caller, "escrow contract paused");
        Ok(())
    }

    pub fn unpause(&mut self, chain: &Chain, ctx: &CallContext) -> Result<(), EscrowError> {
        Self::reject_value(ctx)?;
        self.admin.unpause(&ctx.caller)?;
        self.emit(chain, EscrowEvent::Unpaused { account: ctx.caller });
        tracing::info!(by = %ctx.caller, "escrow contract unpaused");
        Ok(())
    }

    pub fn transfer_ownership(&mut self, chain: &Chain, ctx: &CallContext, new_owner: Address) -> Result<(), EscrowError> {
        Self::reject_value(ctx)?;
        let previous_owner = self.admin.transfer_ownership(&ctx.caller, new_owner)?;
        self.emit(
            chain,
            EscrowEvent::OwnershipTransferred {
                previous_owner,
                new_owner,
            },
        );
        tracing::info!(from = %previous_owner, to = %new_owner, "ownership transferred");
        Ok(())
    }

    pub fn renounce_ownership(&mut self, chain: &Chain, ctx: &CallContext) -> Result<(), EscrowError> {
        Self::reject_value(ctx)?;
        let previous_owner = self.admin.renounce_ownership(&ctx.caller)?;
        self.emit(
            chain,
            EscrowEvent::OwnershipTransferred {
                previous_owner,
                new_owner: Address::ZERO,
            },
        );
        tracing::warn!(from = %previous_owner, "ownership renounced");
        Ok(())
    }

    /// Owner moves idle funds out of the contract while it is paused.
    ///
    /// Only the part of the contract's balance not backing an active escrow
    /// can be moved. With yield custody active funds sit in the pool, so
    /// the whole idle balance is rescuable.
    pub fn rescue_tokens(
        &mut self,
        chain: &mut Chain,
        ctx: &CallContext,
        token_addr: Address,
        to: Address,
        amount: Amount,
    ) -> Result<(), EscrowError> {
        Self::reject_value(ctx)?;
        self.admin.require_owner(&ctx.caller)?;
        self.admin.require_paused()?;
        if to.is_zero() {
            return Err(EscrowError::ZeroAddressNotAllowed);
        }
        if amount == 0 {
            return Err(EscrowError::ZeroAmountNotAllowed);
        }

        self.atomic(chain, |this, chain| {
            let _lock = this.guard.enter()?;
            let asset = Asset::from_token_addr(token_addr);
            let balance = chain
                .bank
                .balance_of(&asset, &this.address)
                .map_err(|_| EscrowError::TokenNotSupported(token_addr))?;
            let locked = if this.custody.holds_funds_in_contract() {
                this.ledger.locked_amount(&asset)
            } else {
                0
            };
            if amount > balance.saturating_sub(locked) {
                return Err(EscrowError::InsufficientBalance(amount));
            }

            chain.bank.transfer(&asset, this.address, to, amount)?;
            this.emit(
                chain,
                EscrowEvent::TokensRescued {
                    token: token_addr,
                    to,
                    amount,
                },
            );
            tracing::warn!(token = %token_addr, to = %to, amount, "idle funds rescued");
            Ok(())
        })
    }

    /// Accepts plain native value sent to the contract. Such funds back no
    /// escrow and are only recoverable through [`Self::rescue_tokens`].
    pub fn receive(&mut self, chain: &mut Chain, ctx: &CallContext) -> Result<(), EscrowError> {
        self.collect_value(chain, ctx)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Runs `f` and restores every piece of state it could touch if it fails.
    ///
    /// The snapshot is a full clone of the chain and the contract state, so
    /// every mutating call costs O(state size). That is fine for a devnet
    /// chain; a larger deployment would journal only the touched accounts.
    fn atomic<T>(
        &mut self,
        chain: &mut Chain,
        f: impl FnOnce(&mut Self, &mut Chain) -> Result<T, EscrowError>,
    ) -> Result<T, EscrowError> {
        let ledger = self.ledger.clone();
        let custody = self.custody.clone();
        let admin = self.admin.clone();
        let events_len = self.events.len();
        let chain_before = chain.clone();

        let result = f(self, chain);
        if let Err(e) = &result {
            self.ledger = ledger;
            self.custody = custody;
            self.admin = admin;
            self.events.truncate(events_len);
            *chain = chain_before;
            tracing::debug!(error = %e, name = e.name(), "escrow call reverted");
        }
        result
    }

    fn reject_value(ctx: &CallContext) -> Result<(), EscrowError> {
        if ctx.value > 0 {
            return Err(EscrowError::UnexpectedNativeValue(ctx.value));
        }
        Ok(())
    }

    /// Moves the attached native value from the caller to the contract.
    fn collect_value(&self, chain: &mut Chain, ctx: &CallContext) -> Result<(), EscrowError> {
        if ctx.value == 0 {
            return Ok(());
        }
        chain
            .bank
            .transfer(&Asset::Native, ctx.caller, self.address, ctx.value)
            .map_err(|_| EscrowError::InsufficientBalance(ctx.value))
    }

    fn custody_context(&self, value: Amount) -> CustodyContext {
        CustodyContext {
            contract: self.address,
            value,
        }
    }

    fn emit(&mut self, chain: &Chain, event: EscrowEvent) {
        let index = self.events.len() as u64;
        tracing::trace!(index, event = event.name(), "event emitted");
        self.events.push(LoggedEvent {
            index,
            block_height: chain.height(),
            timestamp: chain.timestamp(),
            event,
        });
    }
}
