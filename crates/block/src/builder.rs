//! Speculative application of transactions to the block under construction.

use alloy_consensus::{Transaction, TxEnvelope, TxReceipt, transaction::Recovered};
use alloy_primitives::Log;
use kiln_chainspec::hardfork::KilnHardforks;
use kiln_primitives::{BuiltBlock, CandidateBlock, MIN_TRANSACTION_GAS, PendingTransaction};
use kiln_state::{IntraBlockState, StateChangeset, StateProvider, StateWriter};
use tracing::{debug, trace, warn};

use crate::{
    cancel::{CancelCheck, CancellationController},
    error::{BlockBuildError, TxExecutionError},
    executor::{TransactionExecutor, TxExecutionOutcome},
    finalize::{ConsensusEngine, finalize_block, seal_block},
    gas_pool::GasPool,
    stream::TransactionStream,
};

/// Why [`BlockBuilder::execute_transactions`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The stream ran out of transactions; another batch may be fetched.
    Exhausted,
    /// The remaining block gas cannot fit another transaction.
    OutOfGas,
    /// The grace period after an interrupt elapsed.
    Interrupted,
}

impl ApplyOutcome {
    /// Returns `true` if the cycle should stop fetching more transactions.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Exhausted)
    }
}

/// Owns everything a building cycle mutates: the candidate block, its state overlay and its gas
/// pool.
///
/// Transactions are applied one at a time. Each attempt runs inside a state checkpoint with a gas
/// snapshot taken beforehand, so a rejected transaction leaves no trace in the block.
#[derive(Debug)]
pub struct BlockBuilder<P, E, C> {
    /// Fork schedule of the chain.
    chain_spec: C,
    /// Execution engine.
    executor: E,
    /// Block under construction.
    block: CandidateBlock,
    /// State of the block under construction.
    state: IntraBlockState<P>,
    /// Gas still available in the block.
    gas_pool: GasPool,
    /// Below this much remaining gas no transaction is attempted.
    min_tx_gas: u64,
    /// Logs of every committed transaction, in order.
    pending_logs: Vec<Log>,
}

impl<P, E, C> BlockBuilder<P, E, C>
where
    P: StateProvider,
    E: TransactionExecutor,
    C: KilnHardforks,
{
    /// Creates a builder for `block` on top of `provider`.
    pub fn new(chain_spec: C, executor: E, block: CandidateBlock, provider: P) -> Self {
        let gas_pool = GasPool::new(block.gas_remaining());
        Self {
            chain_spec,
            executor,
            block,
            state: IntraBlockState::new(provider),
            gas_pool,
            min_tx_gas: MIN_TRANSACTION_GAS,
            pending_logs: Vec::new(),
        }
    }

    /// Sets the admission threshold on remaining gas.
    pub const fn with_min_tx_gas(mut self, min_tx_gas: u64) -> Self {
        self.min_tx_gas = min_tx_gas;
        self
    }

    /// Returns the block under construction.
    pub const fn block(&self) -> &CandidateBlock {
        &self.block
    }

    /// Returns the state of the block under construction.
    pub const fn state(&self) -> &IntraBlockState<P> {
        &self.state
    }

    /// Returns the gas pool.
    pub const fn gas_pool(&self) -> &GasPool {
        &self.gas_pool
    }

    /// Returns the logs of the committed transactions.
    pub fn pending_logs(&self) -> &[Log] {
        &self.pending_logs
    }

    /// Takes the logs collected so far.
    pub fn take_pending_logs(&mut self) -> Vec<Log> {
        core::mem::take(&mut self.pending_logs)
    }

    /// Number of transactions included so far.
    pub fn tx_count(&self) -> usize {
        self.block.len()
    }

    /// Takes the pre-supplied transactions out of the block, if a non-empty list is present.
    pub fn take_prepared_transactions(&mut self) -> Option<Vec<PendingTransaction>> {
        if !self.block.has_prepared_transactions() {
            return None;
        }
        self.block.take_prepared_transactions()
    }

    /// Applies protocol changes that precede the first transaction.
    pub fn apply_pre_execution_changes<Eng: ConsensusEngine>(
        &mut self,
        engine: &Eng,
    ) -> Result<(), BlockBuildError> {
        let number = self.block.number();
        if self.chain_spec.is_dao_fork_block(number) {
            debug!(target: "payload_builder", number, "applying DAO hardfork state changes");
            engine.apply_dao_fork(&mut self.state).map_err(BlockBuildError::PreExecution)?;
        }
        engine.initialize(&self.block.header, &mut self.state).map_err(BlockBuildError::PreExecution)
    }

    /// Applies transactions from `stream` until it is exhausted, the block is full or `cancel`
    /// expires.
    ///
    /// Per-transaction failures are logged and skipped. Only storage failures and the quit
    /// signal are returned as errors.
    pub fn execute_transactions<S: TransactionStream>(
        &mut self,
        mut stream: S,
        cancel: &mut CancellationController,
    ) -> Result<ApplyOutcome, BlockBuildError> {
        loop {
            if cancel.poll()? == CancelCheck::Expired {
                debug!(target: "tx_selection", included = self.tx_count(), "stopping after interrupt grace period");
                return Ok(ApplyOutcome::Interrupted);
            }

            // If we don't have enough gas for any further transactions then we're done
            if self.gas_pool.gas() < self.min_tx_gas {
                debug!(target: "tx_selection", have = self.gas_pool.gas(), want = self.min_tx_gas, "not enough gas for further transactions");
                return Ok(ApplyOutcome::OutOfGas);
            }

            let Some(pending) = stream.peek().cloned() else {
                return Ok(ApplyOutcome::Exhausted);
            };
            let hash = pending.hash();

            let sender = match pending.recover_sender() {
                Ok(sender) => sender,
                Err(err) => {
                    warn!(target: "tx_selection", %hash, %err, "could not recover transaction sender");
                    stream.shift();
                    continue;
                }
            };

            if pending.is_replay_protected() &&
                !self.chain_spec.is_replay_protection_active_at_block(self.block.number())
            {
                debug!(target: "tx_selection", %hash, "ignoring replay protected transaction");
                stream.shift();
                continue;
            }

            let nonce = pending.nonce();
            match self.commit_transaction(pending.into_recovered(sender)) {
                Ok(gas_used) => {
                    trace!(target: "tx_selection", %hash, %sender, nonce, gas_used, "included transaction");
                    stream.shift();
                }
                Err(err @ TxExecutionError::GasLimitReached { .. }) => {
                    debug!(target: "tx_selection", %hash, %sender, %err, "gas limit exceeded for block");
                    stream.shift();
                }
                Err(err @ TxExecutionError::NonceTooLow { .. }) => {
                    // The pool and the builder raced on the account nonce.
                    debug!(target: "tx_selection", %hash, %sender, nonce, %err, "skipping transaction with low nonce");
                    stream.shift();
                }
                Err(err @ TxExecutionError::NonceTooHigh { .. }) => {
                    debug!(target: "tx_selection", %hash, %sender, nonce, %err, "skipping sender after transaction with high nonce");
                    stream.pop();
                }
                Err(err) if err.is_fatal() => {
                    return Err(BlockBuildError::Execution { hash, source: err });
                }
                Err(err) => {
                    debug!(target: "tx_selection", %hash, %sender, %err, "skipping transaction");
                    stream.shift();
                }
            }
        }
    }

    /// Runs `tx` inside a checkpoint and keeps its effects if it succeeds.
    ///
    /// Returns the gas used. On error the state and the gas pool are exactly as before the call.
    fn commit_transaction(&mut self, tx: Recovered<TxEnvelope>) -> Result<u64, TxExecutionError> {
        let checkpoint = self.state.checkpoint();
        let gas_snapshot = self.gas_pool.snapshot();

        match self.execute_transaction(&tx) {
            Ok(TxExecutionOutcome { gas_used, success, logs }) => {
                self.state.commit(checkpoint);
                let receipt = self.block.append_transaction(tx, success, gas_used, logs);
                self.pending_logs.extend(receipt.logs().iter().cloned());
                Ok(gas_used)
            }
            Err(err) => {
                self.state.rollback(checkpoint);
                self.gas_pool.restore(gas_snapshot);
                Err(err)
            }
        }
    }

    /// Buys the gas limit of `tx`, executes it and refunds the unused gas.
    fn execute_transaction(
        &mut self,
        tx: &Recovered<TxEnvelope>,
    ) -> Result<TxExecutionOutcome, TxExecutionError> {
        let gas_limit = tx.gas_limit();
        self.gas_pool.sub_gas(gas_limit)?;

        let outcome = self.executor.execute(&self.block.header, tx, &mut self.state)?;
        if outcome.gas_used > gas_limit {
            return Err(TxExecutionError::Invalid(format!(
                "gas used {} exceeds gas limit {gas_limit}",
                outcome.gas_used
            )));
        }
        self.gas_pool.add_gas(gas_limit - outcome.gas_used);

        Ok(outcome)
    }

    /// Finalizes the block through `engine` and persists its state through `writer`.
    ///
    /// Consumes the builder, so a block is finalized exactly once.
    pub fn finish<Eng, W>(self, engine: &Eng, writer: W) -> Result<BuiltBlock, BlockBuildError>
    where
        Eng: ConsensusEngine,
        W: StateWriter,
    {
        let Self { block, state, .. } = self;
        finalize_block(block, state, engine, writer)
    }

    /// Finalizes the block through `engine` without persisting anything.
    ///
    /// Returns the sealed block and the state changeset the caller has to persist.
    pub fn seal<Eng: ConsensusEngine>(
        self,
        engine: &Eng,
    ) -> Result<(BuiltBlock, StateChangeset), BlockBuildError> {
        let Self { block, state, .. } = self;
        seal_block(block, state, engine)
    }
}
