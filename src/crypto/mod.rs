//! Cryptographic signature backends.

pub mod ecdsa;
pub mod ed25519;
pub mod signer;
