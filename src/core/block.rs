//! Block structure and multi-threaded proof-of-work mining.
//!
//! A block's hash commits to its index, timestamp, previous hash, nonce,
//! and the Merkle root of its transaction ids. Mining partitions the u64
//! nonce space into contiguous shards, one per worker thread; the first
//! worker to find a satisfying nonce raises a shared cancel flag and the
//! rest stop at their next iteration. All workers are joined before the
//! result is returned.

use crate::core::transaction::{unix_nanos, Transaction, TransactionError};
use crate::crypto::signer::Signer;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use minichain_derive::{BinaryCodec, Error};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;

const BLOCK_HASH_SEPARATION: &[u8] = b"BLOCK_HEADER";

/// Errors produced by block verification and mining.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("stored hash does not match the block contents")]
    InvalidHash,

    #[error("hash does not satisfy difficulty {0}")]
    DifficultyNotMet(u32),

    #[error("merkle root does not match the block transactions")]
    InvalidMerkleRoot,

    #[error("nonce space exhausted without a satisfying hash")]
    MiningExhausted,

    #[error("invalid transaction in block: {0}")]
    Transaction(TransactionError),
}

/// One block in the chain. `index` is 1-based; the genesis block has index
/// 1 and a zero previous hash.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct Block {
    pub index: u64,
    /// Unix timestamp in nanoseconds.
    pub timestamp: i64,
    pub hash: Hash,
    pub prev_hash: Hash,
    pub nonce: u64,
    /// Required number of leading zero bits in the hash.
    pub difficulty: u32,
    pub merkle_root: Hash,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Creates an empty unmined block following `prev`, or a genesis block
    /// when `prev` is `None`.
    pub fn next(prev: Option<&Block>, difficulty: u32) -> Block {
        let (index, prev_hash) = match prev {
            Some(prev) => (prev.index + 1, prev.hash),
            None => (1, Hash::zero()),
        };

        Block {
            index,
            timestamp: unix_nanos(),
            hash: Hash::zero(),
            prev_hash,
            nonce: 0,
            difficulty,
            merkle_root: Hash::zero(),
            transactions: Vec::new(),
        }
    }

    /// Appends a transaction. The Merkle root is recomputed at mining time,
    /// so ordering here is the ordering committed to.
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Merkle root over the transaction ids, in block order.
    pub fn compute_merkle_root(&self) -> Hash {
        MerkleTree::build(self.transactions.iter().map(|tx| tx.id).collect()).root()
    }

    /// Header hash for a candidate nonce. Commits to the Merkle root rather
    /// than the raw transaction list.
    fn compute_hash(&self, nonce: u64) -> Hash {
        let mut h = Hash::sha256();
        h.update(BLOCK_HASH_SEPARATION);
        self.index.encode(&mut h);
        self.timestamp.encode(&mut h);
        self.prev_hash.encode(&mut h);
        nonce.encode(&mut h);
        self.merkle_root.encode(&mut h);
        h.finalize()
    }

    /// Searches the nonce space until the header hash has `difficulty`
    /// leading zero bits, then stores the nonce and hash.
    ///
    /// `workers` of 0 uses the machine's available parallelism. Returns the
    /// winning hash, or `MiningExhausted` if every shard ran dry.
    pub fn mine(&mut self, workers: usize) -> Result<Hash, BlockError> {
        self.merkle_root = self.compute_merkle_root();

        let workers = if workers == 0 {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            workers
        };

        let found = AtomicBool::new(false);
        let (result_tx, result_rx) = mpsc::channel();
        let shard = u64::MAX / workers as u64;

        {
            let block = &*self;
            let found = &found;
            thread::scope(|scope| {
                for worker in 0..workers as u64 {
                    let result_tx = result_tx.clone();
                    scope.spawn(move || {
                        let start = worker * shard;
                        let end = if worker == workers as u64 - 1 {
                            u64::MAX
                        } else {
                            start + shard
                        };

                        let mut nonce = start;
                        loop {
                            if found.load(Ordering::Relaxed) {
                                return;
                            }

                            let hash = block.compute_hash(nonce);
                            if meets_difficulty(&hash, block.difficulty) {
                                found.store(true, Ordering::Relaxed);
                                let _ = result_tx.send((nonce, hash));
                                return;
                            }

                            if nonce == end {
                                return;
                            }
                            nonce += 1;
                        }
                    });
                }
            });
        }
        drop(result_tx);

        // The scope joined every worker; at most a few winners raced the
        // flag and the first sent result wins.
        match result_rx.try_recv() {
            Ok((nonce, hash)) => {
                self.nonce = nonce;
                self.hash = hash;
                Ok(hash)
            }
            Err(_) => Err(BlockError::MiningExhausted),
        }
    }

    /// Verifies the block in isolation: the stored hash must match the
    /// recomputed header hash and satisfy the stored difficulty, the Merkle
    /// root must match the transactions, and every transaction must verify.
    pub fn verify<S: Signer>(&self, signer: &S) -> Result<(), BlockError> {
        if self.compute_hash(self.nonce) != self.hash {
            return Err(BlockError::InvalidHash);
        }

        if !meets_difficulty(&self.hash, self.difficulty) {
            return Err(BlockError::DifficultyNotMet(self.difficulty));
        }

        if self.compute_merkle_root() != self.merkle_root {
            return Err(BlockError::InvalidMerkleRoot);
        }

        for tx in &self.transactions {
            tx.verify(signer).map_err(BlockError::Transaction)?;
        }

        Ok(())
    }

    /// Total fees of the block's transactions, `None` if the sum would
    /// overflow.
    pub fn total_fees(&self) -> Option<i64> {
        self.transactions
            .iter()
            .try_fold(0i64, |acc, tx| acc.checked_add(tx.fee))
    }
}

/// True when the hash starts with `difficulty` zero bits.
fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
    let bytes = hash.as_slice();
    if difficulty as usize > bytes.len() * 8 {
        return false;
    }

    let full = (difficulty / 8) as usize;
    if bytes[..full].iter().any(|&b| b != 0) {
        return false;
    }

    let bits = difficulty % 8;
    if bits == 0 {
        return true;
    }
    let mask = 0xFFu8 << (8 - bits);
    bytes[full] & mask == 0
}
