//! The sealed output of a building cycle.

use alloy_consensus::{Block, Header, ReceiptEnvelope, TxEnvelope};
use alloy_primitives::{Address, B256};

/// A finalized block with its hash, senders and receipts.
#[derive(Debug, Clone)]
pub struct BuiltBlock {
    /// The assembled block.
    block: Block<TxEnvelope>,
    /// Hash of the sealed header.
    hash: B256,
    /// Senders of the block transactions, in order.
    senders: Vec<Address>,
    /// Receipts of the block transactions, in order.
    receipts: Vec<ReceiptEnvelope>,
}

impl BuiltBlock {
    /// Seals `block`, computing the header hash.
    pub fn new(block: Block<TxEnvelope>, senders: Vec<Address>, receipts: Vec<ReceiptEnvelope>) -> Self {
        let hash = block.header.hash_slow();
        Self { block, hash, senders, receipts }
    }

    /// Returns the block.
    pub const fn block(&self) -> &Block<TxEnvelope> {
        &self.block
    }

    /// Returns the sealed header.
    pub const fn header(&self) -> &Header {
        &self.block.header
    }

    /// Returns the block hash.
    pub const fn hash(&self) -> B256 {
        self.hash
    }

    /// Returns the block number.
    pub const fn number(&self) -> u64 {
        self.block.header.number
    }

    /// Returns the gas used by all transactions.
    pub const fn gas_used(&self) -> u64 {
        self.block.header.gas_used
    }

    /// Returns the included transactions.
    pub fn transactions(&self) -> &[TxEnvelope] {
        &self.block.body.transactions
    }

    /// Returns the transaction senders.
    pub fn senders(&self) -> &[Address] {
        &self.senders
    }

    /// Returns the receipts.
    pub fn receipts(&self) -> &[ReceiptEnvelope] {
        &self.receipts
    }

    /// Converts the value into the inner [`Block`].
    pub fn into_block(self) -> Block<TxEnvelope> {
        self.block
    }
}
