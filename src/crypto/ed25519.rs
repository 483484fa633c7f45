//! Ed25519 signature backend.
//!
//! 32-byte private and public keys, 64-byte signatures.

use crate::crypto::signer::{SignatureKeys, Signer, SignerError};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand_core::OsRng;

/// Ed25519 backend via `ed25519-dalek`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Signer;

impl Signer for Ed25519Signer {
    fn generate_key_pair(&self) -> Result<SignatureKeys, SignerError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        Ok(SignatureKeys {
            private_key: signing_key.to_bytes().to_vec(),
            public_key: signing_key.verifying_key().to_bytes().to_vec(),
        })
    }

    fn sign(&self, data: &[u8], private_key: &[u8]) -> Result<Vec<u8>, SignerError> {
        let raw: [u8; 32] = private_key
            .try_into()
            .map_err(|_| SignerError::InvalidPrivateKey)?;
        let signing_key = SigningKey::from_bytes(&raw);
        Ok(signing_key.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
        let raw: [u8; 32] = match public_key.try_into() {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        let verifying_key = match VerifyingKey::from_bytes(&raw) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let signer = Ed25519Signer;
        let keys = signer.generate_key_pair().unwrap();
        let signature = signer.sign(b"payload", &keys.private_key).unwrap();
        assert!(signer.verify(b"payload", &signature, &keys.public_key));
    }

    #[test]
    fn wrong_key_fails() {
        let signer = Ed25519Signer;
        let keys = signer.generate_key_pair().unwrap();
        let other = signer.generate_key_pair().unwrap();
        let signature = signer.sign(b"payload", &keys.private_key).unwrap();
        assert!(!signer.verify(b"payload", &signature, &other.public_key));
    }

    #[test]
    fn tampered_data_fails() {
        let signer = Ed25519Signer;
        let keys = signer.generate_key_pair().unwrap();
        let signature = signer.sign(b"payload", &keys.private_key).unwrap();
        assert!(!signer.verify(b"tampered", &signature, &keys.public_key));
    }

    #[test]
    fn malformed_inputs_fail_closed() {
        let signer = Ed25519Signer;
        let keys = signer.generate_key_pair().unwrap();
        let signature = signer.sign(b"payload", &keys.private_key).unwrap();

        assert!(!signer.verify(b"payload", &signature, b"short key"));
        assert!(!signer.verify(b"payload", b"short signature", &keys.public_key));
        assert!(matches!(
            signer.sign(b"payload", b"short"),
            Err(SignerError::InvalidPrivateKey)
        ));
    }

    #[test]
    fn key_and_signature_sizes() {
        let signer = Ed25519Signer;
        let keys = signer.generate_key_pair().unwrap();
        assert_eq!(keys.private_key.len(), 32);
        assert_eq!(keys.public_key.len(), 32);
        let signature = signer.sign(b"payload", &keys.private_key).unwrap();
        assert_eq!(signature.len(), 64);
    }
}
