//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around `ed25519-dalek`. Accounts sign call
//! envelopes; the node verifies them and derives the caller address.
//! Nothing here is hand-rolled.

pub mod keys;
pub mod signatures;

pub use keys::{KeyError, Keypair, PublicKey, Signature};
pub use signatures::{recover_signer, sign_to_hex, SignatureError};
