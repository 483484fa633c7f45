//! The chain itself: blocks, pending pool, ledger, and the chain's own
//! key pair for signing coinbase rewards.
//!
//! All mutable state lives behind one mutex so pool admission, mining, and
//! external block acceptance serialize against each other. Blocks commit
//! atomically: every transaction in a block is staged against the ledger
//! and the whole batch is confirmed or rejected together.

use crate::core::block::{Block, BlockError};
use crate::core::ledger::Ledger;
use crate::core::processor::ProcessorError;
use crate::core::registry::TransactionRegistry;
use crate::core::transaction::{Transaction, TransactionError, TxKind};
use crate::crypto::signer::{SignatureKeys, Signer, SignerError};
use crate::types::address::Address;
use crate::{info, warn};
use minichain_derive::Error;
use serde_json::json;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Errors produced by chain-level operations.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("signer failure: {0}")]
    Signer(SignerError),

    #[error("invalid transaction: {0}")]
    Transaction(TransactionError),

    #[error("invalid block: {0}")]
    Block(BlockError),

    #[error("transaction rejected: {0}")]
    Processor(ProcessorError),

    #[error("block difficulty {actual} is below the chain minimum {minimum}")]
    DifficultyTooLow { actual: u32, minimum: u32 },

    #[error("chain broken at block {index}")]
    BrokenChain { index: u64 },
}

/// Everything that changes over the chain's lifetime.
struct ChainState {
    blocks: Vec<Block>,
    pool: Vec<Transaction>,
    ledger: Ledger,
    keys: SignatureKeys,
}

/// A single-node chain over a pluggable signature backend.
pub struct Blockchain<S: Signer> {
    reward: i64,
    difficulty: u32,
    signer: S,
    registry: TransactionRegistry,
    inner: Mutex<ChainState>,
}

impl<S: Signer> Blockchain<S> {
    /// Creates a chain and mines its genesis block, paying the initial
    /// reward to `creator`.
    pub fn new(
        reward: i64,
        difficulty: u32,
        creator: Address,
        signer: S,
        registry: TransactionRegistry,
    ) -> Result<Self, ChainError> {
        let keys = signer.generate_key_pair().map_err(ChainError::Signer)?;
        let chain = Blockchain {
            reward,
            difficulty,
            signer,
            registry,
            inner: Mutex::new(ChainState {
                blocks: Vec::new(),
                pool: Vec::new(),
                ledger: Ledger::new(),
                keys,
            }),
        };

        {
            let mut state = chain.lock();
            let mut block = Block::next(None, difficulty);
            let coinbase = chain.coinbase(creator, reward, &state.keys)?;
            block.add_transaction(coinbase);
            block.mine(0).map_err(ChainError::Block)?;
            chain.commit_block(&mut state, block)?;
        }

        info!("chain initialized, genesis reward {} paid to {}", reward, creator);
        Ok(chain)
    }

    /// The registry this chain dispatches transactions through.
    pub fn registry(&self) -> &TransactionRegistry {
        &self.registry
    }

    /// Verifies a transaction and admits it to the pending pool if its
    /// kind's processor accepts it against the current ledger.
    pub fn add_transaction_to_pool(&self, tx: Transaction) -> Result<(), ChainError> {
        tx.verify(&self.signer).map_err(ChainError::Transaction)?;

        let mut state = self.lock();
        self.registry
            .validate(&tx, &state.ledger)
            .map_err(ChainError::Processor)?;

        info!("pooled transaction {}", tx);
        state.pool.push(tx);
        Ok(())
    }

    /// Mines the pending pool into a new block.
    ///
    /// The block carries a coinbase transaction paying the block reward plus
    /// every pooled fee to `beneficiary`, followed by the pooled
    /// transactions in admission order. On success the block is committed
    /// and the mined transactions leave the pool; on failure the chain,
    /// ledger, and pool are untouched.
    pub fn mine_block_from_pool(
        &self,
        beneficiary: Address,
        workers: usize,
    ) -> Result<Block, ChainError> {
        let mut state = self.lock();

        let mut block = Block::next(state.blocks.last(), self.difficulty);
        let fees = state
            .pool
            .iter()
            .try_fold(0i64, |acc, tx| acc.checked_add(tx.fee))
            .ok_or(ChainError::Processor(ProcessorError::AmountOverflow))?;
        let payout = self
            .reward
            .checked_add(fees)
            .ok_or(ChainError::Processor(ProcessorError::AmountOverflow))?;
        let coinbase = self.coinbase(beneficiary, payout, &state.keys)?;
        block.add_transaction(coinbase);
        for tx in &state.pool {
            block.add_transaction(tx.clone());
        }

        block.mine(workers).map_err(ChainError::Block)?;
        self.commit_block(&mut state, block.clone())?;

        info!(
            "mined block {} with {} transactions, reward {} to {}",
            block.index,
            block.transactions.len(),
            payout,
            beneficiary
        );
        Ok(block)
    }

    /// Accepts an externally mined block.
    ///
    /// The block must meet the chain's minimum difficulty, extend the
    /// current tip, and commit cleanly.
    pub fn add_block(&self, block: Block) -> Result<(), ChainError> {
        if block.difficulty < self.difficulty {
            return Err(ChainError::DifficultyTooLow {
                actual: block.difficulty,
                minimum: self.difficulty,
            });
        }

        let mut state = self.lock();
        self.commit_block(&mut state, block)
    }

    /// Walks the chain backwards re-verifying blocks and their hash links.
    ///
    /// `depth` bounds how many recent blocks are checked; 0 checks the
    /// whole chain.
    pub fn verify(&self, depth: usize) -> Result<(), ChainError> {
        let state = self.lock();
        let checked = if depth == 0 || depth > state.blocks.len() {
            state.blocks.len()
        } else {
            depth
        };

        for offset in 0..checked {
            let pos = state.blocks.len() - 1 - offset;
            let block = &state.blocks[pos];
            block.verify(&self.signer).map_err(ChainError::Block)?;

            let expected_prev = if pos == 0 {
                crate::types::hash::Hash::zero()
            } else {
                state.blocks[pos - 1].hash
            };
            if block.prev_hash != expected_prev {
                return Err(ChainError::BrokenChain { index: block.index });
            }
        }
        Ok(())
    }

    /// Confirmed balance of an address.
    pub fn get_balance(&self, address: &Address) -> i64 {
        self.lock().ledger.get_balance(address)
    }

    /// Number of blocks in the chain, genesis included.
    pub fn block_count(&self) -> usize {
        self.lock().blocks.len()
    }

    /// Number of pending transactions.
    pub fn pool_size(&self) -> usize {
        self.lock().pool.len()
    }

    /// A copy of the current tip.
    pub fn latest_block(&self) -> Option<Block> {
        self.lock().blocks.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn replace_block(&self, index: usize, block: Block) {
        self.lock().blocks[index] = block;
    }

    /// A reward transaction from the coinbase address, signed with the
    /// chain's own keys.
    fn coinbase(
        &self,
        recipient: Address,
        amount: i64,
        keys: &SignatureKeys,
    ) -> Result<Transaction, ChainError> {
        let mut tx = self
            .registry
            .create(
                TxKind::CoinTransfer.tag(),
                &Address::COINBASE.to_string(),
                amount,
                0,
                &json!({ "recipient": recipient.to_string() }),
            )
            .map_err(ChainError::Transaction)?;
        tx.sign(&self.signer, keys).map_err(ChainError::Transaction)?;
        Ok(tx)
    }

    /// Verifies a block, checks that it extends the tip, then applies its
    /// transactions two-phase: all are staged, and the batch confirms only
    /// if every one succeeds. Any failure rejects the staged state and
    /// leaves chain, ledger, and pool as they were.
    fn commit_block(&self, state: &mut ChainState, block: Block) -> Result<(), ChainError> {
        block.verify(&self.signer).map_err(ChainError::Block)?;

        let linked = match state.blocks.last() {
            Some(tip) => block.index == tip.index + 1 && block.prev_hash == tip.hash,
            None => block.index == 1,
        };
        if !linked {
            return Err(ChainError::BrokenChain { index: block.index });
        }

        for tx in &block.transactions {
            if let Err(e) = self.registry.process(tx, &mut state.ledger) {
                warn!("rejecting block {}: transaction {} failed: {}", block.index, tx, e);
                state.ledger.reject();
                return Err(ChainError::Processor(e));
            }
        }
        state.ledger.confirm();

        state
            .pool
            .retain(|pending| !block.transactions.iter().any(|tx| tx.id == pending.id));
        state.blocks.push(block);
        Ok(())
    }
}

impl<S: Signer> fmt::Display for Blockchain<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        writeln!(
            f,
            "chain: {} blocks, {} pending, difficulty {}",
            state.blocks.len(),
            state.pool.len(),
            self.difficulty
        )?;
        for block in &state.blocks {
            writeln!(
                f,
                "  #{} {} txs={} nonce={}",
                block.index,
                block.hash,
                block.transactions.len(),
                block.nonce
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecdsa::EcdsaSigner;

    const REWARD: i64 = 50;
    const DIFFICULTY: u32 = 8;

    fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    fn new_chain(creator: Address) -> Blockchain<EcdsaSigner> {
        Blockchain::new(
            REWARD,
            DIFFICULTY,
            creator,
            EcdsaSigner,
            TransactionRegistry::standard(),
        )
        .expect("chain creation failed")
    }

    fn signed_transfer(
        chain: &Blockchain<EcdsaSigner>,
        sender: Address,
        recipient: Address,
        value: i64,
        fee: i64,
    ) -> Transaction {
        let signer = EcdsaSigner;
        let keys = signer.generate_key_pair().unwrap();
        let mut tx = chain
            .registry()
            .create(
                "coin_transfer",
                &sender.to_string(),
                value,
                fee,
                &json!({ "recipient": recipient.to_string() }),
            )
            .unwrap();
        tx.sign(&signer, &keys).unwrap();
        tx
    }

    #[test]
    fn genesis_pays_the_creator() {
        let creator = addr(1);
        let chain = new_chain(creator);

        assert_eq!(chain.block_count(), 1);
        assert_eq!(chain.get_balance(&creator), REWARD);
        assert_eq!(chain.pool_size(), 0);
        chain.verify(0).unwrap();
    }

    #[test]
    fn transfer_mines_and_settles_balances() {
        let creator = addr(1);
        let recipient = addr(2);
        let miner = addr(3);
        let chain = new_chain(creator);

        let tx = signed_transfer(&chain, creator, recipient, 10, 1);
        chain.add_transaction_to_pool(tx).unwrap();
        assert_eq!(chain.pool_size(), 1);

        let block = chain.mine_block_from_pool(miner, 2).unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(block.transactions.len(), 2);

        assert_eq!(chain.get_balance(&creator), 39);
        assert_eq!(chain.get_balance(&recipient), 10);
        assert_eq!(chain.get_balance(&miner), REWARD + 1);
        assert_eq!(chain.pool_size(), 0);
        assert_eq!(chain.block_count(), 2);
        chain.verify(2).unwrap();
    }

    #[test]
    fn pool_rejects_overspending_transaction() {
        let creator = addr(1);
        let chain = new_chain(creator);

        let tx = signed_transfer(&chain, creator, addr(2), REWARD, 1);
        assert!(matches!(
            chain.add_transaction_to_pool(tx),
            Err(ChainError::Processor(ProcessorError::InsufficientBalance { .. }))
        ));
        assert_eq!(chain.pool_size(), 0);
    }

    #[test]
    fn pool_rejects_unsigned_transaction() {
        let creator = addr(1);
        let chain = new_chain(creator);

        let tx = chain
            .registry()
            .create(
                "coin_transfer",
                &creator.to_string(),
                10,
                1,
                &json!({ "recipient": addr(2).to_string() }),
            )
            .unwrap();
        assert!(matches!(
            chain.add_transaction_to_pool(tx),
            Err(ChainError::Transaction(TransactionError::BadSignature))
        ));
    }

    #[test]
    fn failed_block_rolls_back_ledger_and_keeps_pool() {
        let creator = addr(1);
        let chain = new_chain(creator);

        // Each spend passes pool validation against the confirmed balance of
        // 50, but together they overdraw once the first one is staged.
        let first = signed_transfer(&chain, creator, addr(2), 40, 1);
        let second = signed_transfer(&chain, creator, addr(3), 40, 1);
        chain.add_transaction_to_pool(first).unwrap();
        chain.add_transaction_to_pool(second).unwrap();

        let result = chain.mine_block_from_pool(addr(4), 2);
        assert!(matches!(
            result,
            Err(ChainError::Processor(ProcessorError::InsufficientBalance { .. }))
        ));

        assert_eq!(chain.block_count(), 1);
        assert_eq!(chain.pool_size(), 2);
        assert_eq!(chain.get_balance(&creator), REWARD);
        assert_eq!(chain.get_balance(&addr(2)), 0);
        assert_eq!(chain.get_balance(&addr(4)), 0);
        chain.verify(0).unwrap();
    }

    #[test]
    fn mining_rejects_fee_sum_overflow() {
        let creator = addr(1);
        let chain = new_chain(creator);

        // Each transaction nets to a zero charge and passes admission, but
        // their fees cannot be summed for the coinbase payout.
        for _ in 0..2 {
            let tx = signed_transfer(&chain, creator, addr(2), -i64::MAX, i64::MAX);
            chain.add_transaction_to_pool(tx).unwrap();
        }

        assert!(matches!(
            chain.mine_block_from_pool(addr(3), 2),
            Err(ChainError::Processor(ProcessorError::AmountOverflow))
        ));
        assert_eq!(chain.block_count(), 1);
        assert_eq!(chain.get_balance(&creator), REWARD);
    }

    #[test]
    fn verify_detects_rewritten_history() {
        let creator = addr(1);
        let chain = new_chain(creator);
        chain.mine_block_from_pool(addr(2), 2).unwrap();
        chain.mine_block_from_pool(addr(2), 2).unwrap();
        chain.verify(0).unwrap();

        // Swap in a self-consistent genesis the stored successor does not
        // link to.
        let mut forged = Block::next(None, DIFFICULTY);
        forged.mine(2).unwrap();
        chain.replace_block(0, forged);

        assert!(matches!(
            chain.verify(0),
            Err(ChainError::BrokenChain { index: 2 })
        ));
        // A shallow walk stops before the severed link.
        chain.verify(1).unwrap();
    }

    #[test]
    fn add_block_accepts_a_valid_extension() {
        let creator = addr(1);
        let chain = new_chain(creator);
        let tip = chain.latest_block().unwrap();

        let mut block = Block::next(Some(&tip), DIFFICULTY);
        block.add_transaction(signed_transfer(&chain, creator, addr(2), 10, 0));
        block.mine(2).unwrap();

        chain.add_block(block).unwrap();
        assert_eq!(chain.block_count(), 2);
        assert_eq!(chain.get_balance(&creator), 40);
        assert_eq!(chain.get_balance(&addr(2)), 10);
        chain.verify(0).unwrap();
    }

    #[test]
    fn add_block_rejects_low_difficulty() {
        let chain = new_chain(addr(1));
        let tip = chain.latest_block().unwrap();

        let mut block = Block::next(Some(&tip), DIFFICULTY - 1);
        block.mine(2).unwrap();

        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::DifficultyTooLow { actual: 7, minimum: 8 })
        ));
        assert_eq!(chain.block_count(), 1);
    }

    #[test]
    fn add_block_rejects_a_detached_block() {
        let chain = new_chain(addr(1));

        // Not linked to the tip: prev_hash is zero and the index restarts.
        let mut block = Block::next(None, DIFFICULTY);
        block.mine(2).unwrap();

        assert!(matches!(
            chain.add_block(block),
            Err(ChainError::BrokenChain { index: 1 })
        ));
        assert_eq!(chain.block_count(), 1);
    }

    #[test]
    fn contract_deploy_and_call_settle_through_the_chain() {
        let creator = addr(1);
        let chain = new_chain(creator);
        let signer = EcdsaSigner;
        let keys = signer.generate_key_pair().unwrap();

        let mut deploy = chain
            .registry()
            .create(
                "contract_deploy",
                &creator.to_string(),
                0,
                2,
                &json!({
                    "code": "deadbeef",
                    "owner": creator.to_string(),
                    "initialSupply": 30,
                }),
            )
            .unwrap();
        deploy.sign(&signer, &keys).unwrap();
        let contract = deploy.contract_address().unwrap();

        chain.add_transaction_to_pool(deploy).unwrap();
        chain.mine_block_from_pool(addr(5), 2).unwrap();

        assert_eq!(chain.get_balance(&creator), REWARD - 32);
        assert_eq!(chain.get_balance(&contract), 30);
        assert_eq!(chain.get_balance(&addr(5)), REWARD + 2);
        chain.verify(0).unwrap();
    }

    #[test]
    fn display_lists_every_block() {
        let chain = new_chain(addr(1));
        chain.mine_block_from_pool(addr(2), 2).unwrap();

        let rendered = chain.to_string();
        assert!(rendered.contains("2 blocks"));
        assert!(rendered.contains("#1"));
        assert!(rendered.contains("#2"));
    }
}
