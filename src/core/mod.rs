//! Core chain machinery.
//!
//! This module contains the moving parts of the chain:
//! - `Block`: proof-of-work block with a Merkle commitment over its
//!   transactions
//! - `Blockchain`: the chain state machine tying blocks, pool, and ledger
//!   together
//! - `Ledger`: account balances with staged and confirmed state
//! - `Transaction` and its registry/processors: the pluggable transaction
//!   kinds and how they mutate the ledger

pub mod block;
pub mod blockchain;
pub mod ledger;
pub mod processor;
pub mod registry;
pub mod transaction;
