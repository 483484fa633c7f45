//! Fundamental value types: hashes, addresses, encoding, Merkle trees.

pub mod address;
pub mod encoding;
pub mod hash;
pub mod merkle_tree;
