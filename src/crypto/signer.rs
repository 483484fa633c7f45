//! Signature backend abstraction.
//!
//! The chain treats keys and signatures as opaque byte strings; their
//! lengths and formats are properties of the backend. Any [`Signer`]
//! implementation can drive the chain, and the two provided backends
//! (ECDSA P-256 and Ed25519) are interchangeable.

use minichain_derive::Error;

/// A generated private/public key pair, encoded per backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureKeys {
    pub private_key: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// Errors produced by signature backends.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("private key bytes are not valid for this backend")]
    InvalidPrivateKey,
}

/// Digital signature scheme used to authorize transactions.
///
/// Implementations must be thread-safe; the chain shares one signer across
/// verification of every transaction in a block.
pub trait Signer: Send + Sync {
    /// Generates a fresh key pair.
    fn generate_key_pair(&self) -> Result<SignatureKeys, SignerError>;

    /// Signs `data` with the given private key bytes.
    fn sign(&self, data: &[u8], private_key: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// Verifies `signature` over `data` against the given public key bytes.
    ///
    /// Malformed keys or signatures verify as `false` rather than erroring;
    /// a signature that cannot be parsed is simply not a valid signature.
    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> bool;
}
