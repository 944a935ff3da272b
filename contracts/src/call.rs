//! # Call Dispatch
//!
//! Every write to the contract can be expressed as a [`Call`]. The node
//! receives calls inside a [`SignedCall`] envelope:
//!
//! ```text
//! payload = "escrow-call-v1" ‖ chain_id (BE u64) ‖ nonce (BE u64)
//!         ‖ value (BE u128) ‖ JSON(call)
//! ```
//!
//! The signer's address becomes the caller. The nonce is consumed before
//! the call executes, so a reverted call still uses it up.

use escrow_protocol::amount::as_decimal_str;
use escrow_protocol::config::CALL_SIGNING_DOMAIN;
use escrow_protocol::crypto::{recover_signer, sign_to_hex, Keypair, SignatureError};
use escrow_protocol::{Address, Amount, Chain, ChainError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contract::{CallContext, EscrowContract};
use crate::error::EscrowError;
use crate::events::LoggedEvent;

/// A write call, serialized as `{"method": "...", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum Call {
    #[serde(rename_all = "camelCase")]
    CreateEscrowTransaction {
        beneficiary: Address,
        token_addr: Address,
        #[serde(with = "as_decimal_str")]
        token_amount: Amount,
        unlock_time: u64,
    },
    ApproveEscrowTransaction {
        id: u64,
    },
    CancelEscrowTransaction {
        id: u64,
    },
    InitiateDispute {
        id: u64,
    },
    CloseDisputeAndApprove {
        id: u64,
    },
    CloseDisputeAndCancel {
        id: u64,
    },
    Pause,
    Unpause,
    #[serde(rename_all = "camelCase")]
    RescueTokens {
        token_addr: Address,
        to: Address,
        #[serde(with = "as_decimal_str")]
        amount: Amount,
    },
    #[serde(rename_all = "camelCase")]
    TransferOwnership {
        new_owner: Address,
    },
    RenounceOwnership,
    /// ERC-20 `approve` on behalf of the caller.
    TokenApprove {
        token: Address,
        spender: Address,
        #[serde(with = "as_decimal_str")]
        amount: Amount,
    },
    /// Plain native transfer to the contract.
    Receive,
}

impl Call {
    /// The ABI method name.
    pub fn method(&self) -> &'static str {
        match self {
            Call::CreateEscrowTransaction { .. } => "createEscrowTransaction",
            Call::ApproveEscrowTransaction { .. } => "approveEscrowTransaction",
            Call::CancelEscrowTransaction { .. } => "cancelEscrowTransaction",
            Call::InitiateDispute { .. } => "initiateDispute",
            Call::CloseDisputeAndApprove { .. } => "closeDisputeAndApprove",
            Call::CloseDisputeAndCancel { .. } => "closeDisputeAndCancel",
            Call::Pause => "pause",
            Call::Unpause => "unpause",
            Call::RescueTokens { .. } => "rescueTokens",
            Call::TransferOwnership { .. } => "transferOwnership",
            Call::RenounceOwnership => "renounceOwnership",
            Call::TokenApprove { .. } => "tokenApprove",
            Call::Receive => "receive",
        }
    }
}

/// Outcome of a successful call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReceipt {
    /// Set for `createEscrowTransaction`.
    pub escrow_id: Option<u64>,
    /// Events the call emitted, in order.
    pub events: Vec<LoggedEvent>,
}

/// Errors from [`EscrowContract::execute_signed`].
#[derive(Debug, Error)]
pub enum CallError {
    #[error("invalid call signature: {0}")]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Nonce(#[from] ChainError),

    #[error("call encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Contract(#[from] EscrowError),
}

impl CallError {
    pub fn name(&self) -> &'static str {
        match self {
            CallError::Signature(_) => "InvalidSignature",
            CallError::Nonce(_) => "InvalidNonce",
            CallError::Encoding(_) => "InvalidCall",
            CallError::Contract(e) => e.name(),
        }
    }
}

/// A call signed by its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedCall {
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
    pub nonce: u64,
    /// Native value attached to the call.
    #[serde(with = "as_decimal_str", default)]
    pub value: Amount,
    pub call: Call,
    /// Hex-encoded signature over [`SignedCall::payload`].
    pub signature: String,
}

impl SignedCall {
    /// The bytes a sender signs.
    pub fn payload(chain_id: u64, nonce: u64, value: Amount, call: &Call) -> Result<Vec<u8>, CallError> {
        let body = serde_json::to_vec(call).map_err(|e| CallError::Encoding(e.to_string()))?;
        let mut payload = Vec::with_capacity(CALL_SIGNING_DOMAIN.len() + 32 + body.len());
        payload.extend_from_slice(CALL_SIGNING_DOMAIN);
        payload.extend_from_slice(&chain_id.to_be_bytes());
        payload.extend_from_slice(&nonce.to_be_bytes());
        payload.extend_from_slice(&value.to_be_bytes());
        payload.extend_from_slice(&body);
        Ok(payload)
    }

    pub fn sign(
        keypair: &Keypair,
        chain_id: u64,
        nonce: u64,
        value: Amount,
        call: Call,
    ) -> Result<Self, CallError> {
        let payload = Self::payload(chain_id, nonce, value, &call)?;
        Ok(Self {
            public_key: keypair.public_key().to_hex(),
            nonce,
            value,
            signature: sign_to_hex(keypair, &payload),
            call,
        })
    }

    /// Checks the signature against `chain_id` and returns the sender.
    pub fn verify(&self, chain_id: u64) -> Result<Address, CallError> {
        let payload = Self::payload(chain_id, self.nonce, self.value, &self.call)?;
        Ok(recover_signer(&self.public_key, &payload, &self.signature)?)
    }
}

impl EscrowContract {
    /// Dispatches `call` to the matching contract method.
    pub fn execute(&mut self, chain: &mut Chain, ctx: &CallContext, call: &Call) -> Result<CallReceipt, EscrowError> {
        let first_event = self.events().len();
        let escrow_id = match call {
            Call::CreateEscrowTransaction {
                beneficiary,
                token_addr,
                token_amount,
                unlock_time,
            } => Some(self.create_escrow_transaction(
                chain,
                ctx,
                *beneficiary,
                *token_addr,
                *token_amount,
                *unlock_time,
            )?),
            Call::ApproveEscrowTransaction { id } => {
                self.approve_escrow_transaction(chain, ctx, *id)?;
                None
            }
            Call::CancelEscrowTransaction { id } => {
                self.cancel_escrow_transaction(chain, ctx, *id)?;
                None
            }
            Call::InitiateDispute { id } => {
                self.initiate_dispute(chain, ctx, *id)?;
                None
            }
            Call::CloseDisputeAndApprove { id } => {
                self.close_dispute_and_approve(chain, ctx, *id)?;
                None
            }
            Call::CloseDisputeAndCancel { id } => {
                self.close_dispute_and_cancel(chain, ctx, *id)?;
                None
            }
            Call::Pause => {
                self.pause(chain, ctx)?;
                None
            }
            Call::Unpause => {
                self.unpause(chain, ctx)?;
                None
            }
            Call::RescueTokens { token_addr, to, amount } => {
                self.rescue_tokens(chain, ctx, *token_addr, *to, *amount)?;
                None
            }
            Call::TransferOwnership { new_owner } => {
                self.transfer_ownership(chain, ctx, *new_owner)?;
                None
            }
            Call::RenounceOwnership => {
                self.renounce_ownership(chain, ctx)?;
                None
            }
            Call::TokenApprove { token, spender, amount } => {
                if ctx.value > 0 {
                    return Err(EscrowError::UnexpectedNativeValue(ctx.value));
                }
                chain
                    .bank
                    .token_mut(token)
                    .map_err(|_| EscrowError::TokenNotSupported(*token))?
                    .approve(ctx.caller, *spender, *amount)?;
                None
            }
            Call::Receive => {
                self.receive(chain, ctx)?;
                None
            }
        };

        Ok(CallReceipt {
            escrow_id,
            events: self.events()[first_event..].to_vec(),
        })
    }

    /// Verifies `signed`, consumes its nonce and executes the call.
    ///
    /// Returns the sender together with the receipt.
    pub fn execute_signed(&mut self, chain: &mut Chain, signed: &SignedCall) -> Result<(Address, CallReceipt), CallError> {
        let caller = signed.verify(chain.chain_id())?;
        chain.use_nonce(caller, signed.nonce)?;

        let ctx = CallContext::with_value(caller, signed.value);
        tracing::debug!(caller = %caller, nonce = signed.nonce, method = signed.call.method(), "executing signed call");
        let receipt = self.execute(chain, &ctx, &signed.call)?;
        Ok((caller, receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::CustodyKind;

    fn deploy(owner: Address) -> (EscrowContract, Chain) {
        let contract = EscrowContract::deploy(Address::from_label("escrow"), owner, CustodyKind::Direct).unwrap();
        (contract, Chain::new(7, 100))
    }

    #[test]
    fn call_json_shape() {
        let call = Call::CreateEscrowTransaction {
            beneficiary: Address::from_label("bob"),
            token_addr: Address::ZERO,
            token_amount: 5,
            unlock_time: 9,
        };
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["method"], "createEscrowTransaction");
        assert_eq!(v["params"]["tokenAmount"], "5");
        assert_eq!(v["method"], call.method());

        let pause: Call = serde_json::from_str(r#"{"method":"pause"}"#).unwrap();
        assert_eq!(pause, Call::Pause);
    }

    #[test]
    fn signed_call_runs_as_signer() {
        let kp = Keypair::generate();
        let (mut contract, mut chain) = deploy(kp.address());
        let signed = SignedCall::sign(&kp, chain.chain_id(), 0, 0, Call::Pause).unwrap();

        let (caller, receipt) = contract.execute_signed(&mut chain, &signed).unwrap();
        assert_eq!(caller, kp.address());
        assert!(contract.paused());
        assert_eq!(receipt.events.len(), 1);
        assert_eq!(chain.nonce(&caller), 1);
    }

    #[test]
    fn replay_and_wrong_chain_rejected() {
        let kp = Keypair::generate();
        let (mut contract, mut chain) = deploy(kp.address());
        let signed = SignedCall::sign(&kp, chain.chain_id(), 0, 0, Call::Pause).unwrap();
        contract.execute_signed(&mut chain, &signed).unwrap();

        let err = contract.execute_signed(&mut chain, &signed).unwrap_err();
        assert_eq!(err.name(), "InvalidNonce");

        let other = SignedCall::sign(&kp, 99, 1, 0, Call::Unpause).unwrap();
        let err = contract.execute_signed(&mut chain, &other).unwrap_err();
        assert!(matches!(err, CallError::Signature(_)));
    }

    #[test]
    fn reverted_call_still_consumes_nonce() {
        let kp = Keypair::generate();
        let (mut contract, mut chain) = deploy(Address::from_label("someone-else"));
        let signed = SignedCall::sign(&kp, chain.chain_id(), 0, 0, Call::Pause).unwrap();
        let err = contract.execute_signed(&mut chain, &signed).unwrap_err();
        assert_eq!(err.name(), "OwnableUnauthorizedAccount");
        assert_eq!(chain.nonce(&kp.address()), 1);
    }

    #[test]
    fn tampered_value_fails_verification() {
        let kp = Keypair::generate();
        let (_contract, chain) = deploy(kp.address());
        let mut signed = SignedCall::sign(&kp, chain.chain_id(), 0, 10, Call::Receive).unwrap();
        signed.value = 1_000;
        assert!(signed.verify(chain.chain_id()).is_err());
    }
}
