//! ECDSA signature backend over NIST P-256.
//!
//! Private keys are 32-byte scalars, public keys SEC1-encoded points, and
//! signatures 64-byte `r || s` pairs.

use crate::crypto::signer::{SignatureKeys, Signer, SignerError};
use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;

/// NIST P-256 ECDSA backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct EcdsaSigner;

impl Signer for EcdsaSigner {
    fn generate_key_pair(&self) -> Result<SignatureKeys, SignerError> {
        let signing_key = SigningKey::random(&mut OsRng);
        Ok(SignatureKeys {
            private_key: signing_key.to_bytes().to_vec(),
            public_key: signing_key.verifying_key().to_sec1_bytes().to_vec(),
        })
    }

    fn sign(&self, data: &[u8], private_key: &[u8]) -> Result<Vec<u8>, SignerError> {
        let signing_key =
            SigningKey::from_slice(private_key).map_err(|_| SignerError::InvalidPrivateKey)?;
        let signature: Signature = signing_key.sign(data);
        Ok(signature.to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let verifying_key = match VerifyingKey::from_sec1_bytes(public_key) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = match Signature::from_slice(signature) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        verifying_key.verify(data, &signature).is_ok()
    }
}
