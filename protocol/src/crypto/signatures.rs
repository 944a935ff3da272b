//! # Signed Payloads
//!
//! Helpers for the "I got these hex strings off the wire" path: a client
//! submits `(public_key_hex, message, signature_hex)` and the node needs the
//! signer's address or a rejection.
//!
//! Verification failures are deliberately uninformative.

use thiserror::Error;

use super::keys::{Keypair, PublicKey, Signature};
use crate::address::Address;

/// Errors during signature verification.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("malformed public key")]
    InvalidPublicKey,

    #[error("malformed signature")]
    InvalidSignature,
}

/// Signs `message` and returns the hex-encoded signature.
pub fn sign_to_hex(keypair: &Keypair, message: &[u8]) -> String {
    keypair.sign(message).to_hex()
}

/// Verifies a signature given as hex strings and returns the signer's address.
pub fn recover_signer(
    public_key_hex: &str,
    message: &[u8],
    signature_hex: &str,
) -> Result<Address, SignatureError> {
    let public_key =
        PublicKey::from_hex(public_key_hex).map_err(|_| SignatureError::InvalidPublicKey)?;
    let signature =
        Signature::from_hex(signature_hex).map_err(|_| SignatureError::InvalidSignature)?;

    if !public_key.verify(message, &signature) {
        return Err(SignatureError::VerificationFailed);
    }
    Ok(Address::from_public_key(&public_key))
}
