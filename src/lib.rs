//! Single-node educational blockchain.
//!
//! Provides a proof-of-work chain with Merkle transaction commitments, a
//! staged/confirmed account ledger, and a pluggable transaction dispatch
//! layer over interchangeable signature backends.

pub mod core;
pub mod crypto;
pub mod types;
pub mod utils;
