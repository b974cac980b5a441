//! The ledger: confirmed chain plus pending-transaction mempool.
//!
//! The ledger owns the append-only block sequence (starting at the fixed
//! genesis) and the ordered list of locally-valid but unmined
//! transactions. Every state change that must be atomic with respect to
//! concurrent readers (validate-against-tip then append, mine then reset
//! the mempool, whole-chain replacement) is a single `&mut self` method,
//! so one mutex around the ledger gives the node its critical sections.

use std::sync::atomic::AtomicBool;

use crate::consensus::{ProofOfWork, ValidationError, Validator};
use crate::types::block::now_seconds;
use crate::types::tx::TransactionError;
use crate::types::{Block, Transaction};

/// Content of the reward transaction minted for each mined block.
const REWARD_CONTENT: &str = "Mining Reward";
/// Amount credited to the miner per block.
const REWARD_AMOUNT: u64 = 1;

/// Outcome of admitting a transaction into the mempool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxAdmission {
    /// Newly validated and appended.
    Accepted,
    /// A transaction with the same hash is already pending.
    AlreadyPending,
}

/// Outcome of importing an externally received block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockAdmission {
    /// Validated and appended to the tip.
    Appended,
    /// A block with the same hash is already on the chain.
    AlreadyKnown,
}

/// Chain, mempool, and the validation policy binding them.
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    difficulty: usize,
    validator: Validator,
}

impl Ledger {
    /// Creates a ledger holding only the genesis block.
    pub fn new(difficulty: usize) -> Self {
        Self {
            chain: vec![Block::genesis()],
            pending: Vec::new(),
            difficulty,
            validator: Validator,
        }
    }

    /// Confirmed blocks, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Pending (unmined) transactions in arrival order.
    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    /// Number of confirmed blocks, genesis included.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        // The chain always contains at least the genesis block.
        false
    }

    /// The current tip of the chain.
    pub fn get_latest_block(&self) -> &Block {
        self.chain
            .last()
            .expect("the chain always contains the genesis block")
    }

    /// True if a block with the same hash is already on the chain.
    pub fn contains_block(&self, target: &Block) -> bool {
        self.chain.iter().any(|block| block.hash == target.hash)
    }

    /// Net confirmed balance of `address`: credits as recipient minus
    /// debits as sender. Pending transactions are not counted.
    pub fn get_balance(&self, address: &[u8]) -> i64 {
        let mut balance: i64 = 0;
        for block in &self.chain {
            for tx in &block.transactions {
                if tx.sender.as_deref() == Some(address) {
                    balance -= tx.amount as i64;
                }
                if tx.recipient.as_deref() == Some(address) {
                    balance += tx.amount as i64;
                }
            }
        }
        balance
    }

    /// Checks a transaction against the signature rule and the sender's
    /// confirmed balance. System-minted entries (absent sender) pass
    /// without either check.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), TransactionError> {
        let Some(sender) = &tx.sender else {
            return Ok(());
        };

        let Some(public_key) = &tx.sign_public_key else {
            return Err(TransactionError::InvalidSignature);
        };
        if !tx.is_valid(public_key) {
            return Err(TransactionError::InvalidSignature);
        }

        let balance = self.get_balance(sender);
        if balance < tx.amount as i64 {
            return Err(TransactionError::InsufficientFunds {
                balance,
                amount: tx.amount,
            });
        }
        Ok(())
    }

    /// Validates and appends a transaction to the mempool.
    ///
    /// Duplicates (by hash) are reported rather than re-added, so gossip
    /// loops stay idempotent.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<TxAdmission, TransactionError> {
        self.validate_transaction(&tx)?;

        let hash = tx.calculate_hash();
        if self
            .pending
            .iter()
            .any(|pending| pending.calculate_hash() == hash)
        {
            return Ok(TxAdmission::AlreadyPending);
        }

        self.pending.push(tx);
        Ok(TxAdmission::Accepted)
    }

    /// Validates an externally received block against the tip and appends
    /// it. Structure checks come from the [`Validator`]; the difficulty
    /// prefix is enforced here because the validator never inspects work.
    pub fn import_block(&mut self, block: Block) -> Result<BlockAdmission, ValidationError> {
        if self.contains_block(&block) {
            return Ok(BlockAdmission::AlreadyKnown);
        }

        self.validator.validate_block(&block, self.get_latest_block())?;
        if !self.meets_difficulty(&block) {
            return Err(ValidationError::InvalidPow { index: block.index });
        }

        self.chain.push(block);
        Ok(BlockAdmission::Appended)
    }

    /// Mines the whole mempool into one block and appends it.
    ///
    /// Returns `None` when there is nothing to mine, the stop flag was
    /// raised mid-search, or the freshly mined block fails validation.
    /// On success the mempool is reset to the single reward transaction
    /// crediting `miner_address`.
    pub fn mine_pending(
        &mut self,
        pow: &ProofOfWork,
        miner_address: &[u8],
        stop: &AtomicBool,
    ) -> Option<(Block, Transaction)> {
        if self.pending.is_empty() {
            tracing::debug!("no transactions to mine");
            return None;
        }

        let tip = self.get_latest_block();
        // Keep timestamps strictly increasing even on coarse clocks.
        let timestamp = now_seconds().max(tip.timestamp + 1e-6);
        let mut block = Block::new(
            self.chain.len() as u64,
            tip.hash.clone(),
            timestamp,
            self.pending.clone(),
        );

        if !pow.mine(&mut block, stop) {
            return None;
        }

        if !pow.validate(&block) {
            tracing::warn!(index = block.index, "mined block misses the difficulty target");
            return None;
        }
        if let Err(err) = self.validator.validate_block(&block, self.get_latest_block()) {
            tracing::warn!(%err, "mined block was not added to the chain");
            return None;
        }

        let reward = Transaction::new(
            None,
            Some(miner_address.to_vec()),
            REWARD_AMOUNT,
            REWARD_CONTENT,
            None,
        );

        self.chain.push(block.clone());
        self.pending = vec![reward.clone()];
        Some((block, reward))
    }

    /// True if the chain honours all link invariants and every non-genesis
    /// block meets the difficulty target.
    pub fn is_chain_valid(&self) -> bool {
        self.chain_is_valid(&self.chain)
    }

    /// Applies the longest-valid-chain rule to a received chain.
    ///
    /// The local chain is replaced only when the received one is strictly
    /// longer, anchored at the shared genesis, and valid throughout
    /// (links and difficulty). Returns `true` when the replacement
    /// happened.
    pub fn merge_chain(&mut self, received: Vec<Block>) -> bool {
        if received.is_empty() {
            tracing::info!("received empty chain");
            return false;
        }
        if received.len() <= self.chain.len() {
            tracing::debug!(
                received = received.len(),
                local = self.chain.len(),
                "received chain is not longer than the local chain"
            );
            return false;
        }
        if received[0].hash != Block::genesis().hash {
            tracing::warn!("received chain is not anchored at the shared genesis");
            return false;
        }
        if !self.chain_is_valid(&received) {
            tracing::warn!("received chain is not valid");
            return false;
        }

        self.chain = received;
        tracing::info!(len = self.chain.len(), "local chain replaced");
        true
    }

    /// Confirmed and pending transactions exchanged between two
    /// addresses, in chain-then-mempool order. Feeds the host bridge's
    /// conversation views.
    pub fn messages_between(&self, a: &[u8], b: &[u8]) -> Vec<Transaction> {
        let confirmed = self.chain.iter().flat_map(|block| &block.transactions);
        confirmed
            .chain(self.pending.iter())
            .filter(|tx| {
                let sender = tx.sender.as_deref();
                let recipient = tx.recipient.as_deref();
                (sender == Some(a) && recipient == Some(b))
                    || (sender == Some(b) && recipient == Some(a))
            })
            .cloned()
            .collect()
    }

    fn meets_difficulty(&self, block: &Block) -> bool {
        block
            .hash
            .starts_with(&"0".repeat(self.difficulty))
    }

    fn chain_is_valid(&self, chain: &[Block]) -> bool {
        if let Err(err) = self.validator.validate_chain(chain) {
            tracing::warn!(%err, "chain failed validation");
            return false;
        }
        if let Some(block) = chain.iter().skip(1).find(|b| !self.meets_difficulty(b)) {
            tracing::warn!(index = block.index, "chain block misses the difficulty target");
            return false;
        }
        true
    }
}
