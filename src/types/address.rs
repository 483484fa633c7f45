//! 20-byte account address with hex parsing and display.

use crate::types::hash::Hash;
use minichain_derive::{BinaryCodec, Error};
use std::fmt;

/// Account address length in bytes.
pub const ADDRESS_LEN: usize = 20;

/// Fixed-size 20-byte account address.
///
/// Rendered as 40 lowercase hex characters. The all-zero address is the
/// coinbase sentinel: it is the sender of block reward transactions and is
/// exempt from balance and signature checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Address(pub [u8; ADDRESS_LEN]);

/// Errors that can occur when parsing addresses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is not valid hex: {0}")]
    InvalidHex(String),

    #[error("address must decode to {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

impl Address {
    /// The all-zero coinbase address used as the sender of reward payouts.
    pub const COINBASE: Address = Address([0u8; ADDRESS_LEN]);

    /// Parses an address from a hex string.
    ///
    /// The string must decode to exactly 20 bytes; anything else is rejected.
    pub fn from_hex(s: &str) -> Result<Address, AddressError> {
        let bytes = hex::decode(s).map_err(|_| AddressError::InvalidHex(s.to_string()))?;
        let raw: [u8; ADDRESS_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| AddressError::InvalidLength {
                    expected: ADDRESS_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Address(raw))
    }

    /// Derives an address from the leading bytes of a hash.
    ///
    /// Used for deterministic contract addresses.
    pub fn from_hash(hash: &Hash) -> Address {
        let mut raw = [0u8; ADDRESS_LEN];
        raw.copy_from_slice(&hash.as_slice()[..ADDRESS_LEN]);
        Address(raw)
    }

    /// Returns the address as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Returns true when this is the coinbase sentinel address.
    pub fn is_coinbase(&self) -> bool {
        *self == Self::COINBASE
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
