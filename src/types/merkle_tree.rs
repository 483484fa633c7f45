//! Merkle tree with inclusion proofs over 32-byte leaf hashes.
//!
//! Behavior:
//! - An empty tree yields the all-zero root (`Hash::zero()`).
//! - A single-leaf tree's root is the leaf itself and its proof is empty.
//! - Odd levels are padded by duplicating the last node before pairing.
//! - Interior nodes are `SHA256(SHA256(left || right))`.
//!
//! All levels are kept in one flat node vector so inclusion proofs can be
//! produced after construction without rebuilding.

use crate::types::hash::Hash;
use minichain_derive::{BinaryCodec, Error};

/// Errors that can occur during Merkle tree operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a tree from zero leaves")]
    EmptyInput,

    #[error("leaf index {index} out of range for {leaves} leaves")]
    IndexOutOfRange { index: usize, leaves: usize },
}

/// Which side of the current node a proof sibling sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec)]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof: a sibling hash and its side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec)]
pub struct ProofStep {
    pub side: Side,
    pub hash: Hash,
}

/// Merkle tree retaining every level for proof generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// All nodes, leaves first, each level appended after the previous one.
    nodes: Vec<Hash>,
    /// Size of every level that has a parent (all levels except the root).
    level_sizes: Vec<usize>,
    leaf_count: usize,
}

impl MerkleTree {
    fn hash_pair(left: Hash, right: Hash) -> Hash {
        let inner = Hash::sha256()
            .chain(left.as_slice())
            .chain(right.as_slice())
            .finalize();
        Hash::sha256().chain(inner.as_slice()).finalize()
    }

    /// Builds a tree from the given leaves.
    ///
    /// When a level has an odd number of nodes the last node is duplicated
    /// for its pairing. An empty leaf list produces an empty tree whose root
    /// is the zero hash.
    pub fn build(leaves: Vec<Hash>) -> MerkleTree {
        let leaf_count = leaves.len();
        let mut nodes = leaves;
        let mut level_sizes = Vec::new();

        let mut start = 0;
        let mut len = leaf_count;
        while len > 1 {
            level_sizes.push(len);

            let mut read = 0;
            while read < len {
                let left = nodes[start + read];
                let right = if read + 1 < len {
                    nodes[start + read + 1]
                } else {
                    left
                };
                nodes.push(Self::hash_pair(left, right));
                read += 2;
            }

            start += len;
            len = len.div_ceil(2);
        }

        MerkleTree {
            nodes,
            level_sizes,
            leaf_count,
        }
    }

    /// Builds a tree, failing when the caller requires at least one leaf.
    pub fn try_build(leaves: Vec<Hash>) -> Result<MerkleTree, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyInput);
        }
        Ok(Self::build(leaves))
    }

    /// Returns the root commitment; the zero hash for an empty tree.
    pub fn root(&self) -> Hash {
        self.nodes.last().copied().unwrap_or_else(Hash::zero)
    }

    /// Returns the number of leaves the tree was built from.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Produces the inclusion proof for the leaf at `index`.
    ///
    /// Each step carries the sibling hash for one level, bottom up. The
    /// sibling of the last node of an odd-sized level is the node itself,
    /// matching the duplicate-last pairing used by [`MerkleTree::build`].
    pub fn proof(&self, index: usize) -> Result<Vec<ProofStep>, MerkleError> {
        if index >= self.leaf_count {
            return Err(MerkleError::IndexOutOfRange {
                index,
                leaves: self.leaf_count,
            });
        }

        let mut steps = Vec::with_capacity(self.level_sizes.len());
        let mut offset = 0;
        let mut pos = index;

        for &size in &self.level_sizes {
            let (sibling, side) = if pos % 2 == 0 {
                ((pos + 1).min(size - 1), Side::Right)
            } else {
                (pos - 1, Side::Left)
            };

            steps.push(ProofStep {
                side,
                hash: self.nodes[offset + sibling],
            });

            offset += size;
            pos /= 2;
        }

        Ok(steps)
    }

    /// Recomputes the root from a leaf and its proof and compares it to the
    /// expected root. Stateless; does not require the tree.
    pub fn verify_proof(leaf: Hash, proof: &[ProofStep], root: Hash) -> bool {
        let mut current = leaf;
        for step in proof {
            current = match step.side {
                Side::Right => Self::hash_pair(current, step.hash),
                Side::Left => Self::hash_pair(step.hash, current),
            };
        }
        current == root
    }
}
