//! Transactions as handed over by the pool or by a pre-supplied list.

use alloy_consensus::{
    Transaction, TxEnvelope,
    crypto::RecoveryError,
    transaction::{Recovered, SignerRecoverable},
};
use alloy_primitives::{Address, B256};

/// A decoded transaction together with the sender the pool already attributed to it.
///
/// The pool recovers signers on admission, so the builder trusts a supplied sender instead of
/// running signature recovery again. Transactions without a sender (e.g. a pre-supplied list) are
/// recovered lazily when they are about to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    /// The consensus transaction.
    tx: TxEnvelope,
    /// Sender supplied by the pool, if any.
    sender: Option<Address>,
}

impl PendingTransaction {
    /// Creates a pending transaction with an optional pre-computed sender.
    pub const fn new(tx: TxEnvelope, sender: Option<Address>) -> Self {
        Self { tx, sender }
    }

    /// Creates a pending transaction whose sender is already known.
    pub const fn with_sender(tx: TxEnvelope, sender: Address) -> Self {
        Self { tx, sender: Some(sender) }
    }

    /// Creates a pending transaction that still needs signature recovery.
    pub const fn unattributed(tx: TxEnvelope) -> Self {
        Self { tx, sender: None }
    }

    /// Returns the consensus transaction.
    pub const fn tx(&self) -> &TxEnvelope {
        &self.tx
    }

    /// Returns the sender supplied alongside the transaction.
    pub const fn sender(&self) -> Option<Address> {
        self.sender
    }

    /// Returns the transaction hash.
    pub fn hash(&self) -> B256 {
        *self.tx.tx_hash()
    }

    /// Returns the transaction nonce.
    pub fn nonce(&self) -> u64 {
        self.tx.nonce()
    }

    /// Returns the sender, recovering it from the signature when none was supplied.
    pub fn recover_sender(&self) -> Result<Address, RecoveryError> {
        match self.sender {
            Some(sender) => Ok(sender),
            None => self.tx.recover_signer(),
        }
    }

    /// Recovers and stores the sender if none was supplied.
    ///
    /// Transactions whose signature does not recover are returned unchanged.
    pub fn into_attributed(self) -> Self {
        if self.sender.is_some() {
            return self;
        }
        match self.tx.recover_signer() {
            Ok(sender) => Self::with_sender(self.tx, sender),
            Err(_) => self,
        }
    }

    /// Returns `true` if the signature binds the transaction to a chain id (EIP-155).
    ///
    /// Typed transactions always carry a chain id, legacy ones only when signed with EIP-155.
    pub fn is_replay_protected(&self) -> bool {
        match &self.tx {
            TxEnvelope::Legacy(signed) => signed.tx().chain_id.is_some(),
            _ => true,
        }
    }

    /// Pairs the transaction with `sender`.
    pub fn into_recovered(self, sender: Address) -> Recovered<TxEnvelope> {
        Recovered::new_unchecked(self.tx, sender)
    }
}

impl From<Recovered<TxEnvelope>> for PendingTransaction {
    /// Keeps the recovered signer as the supplied sender.
    fn from(recovered: Recovered<TxEnvelope>) -> Self {
        let (tx, sender) = recovered.into_parts();
        Self::with_sender(tx, sender)
    }
}
