//! The mining-exec stage: one full fetch/apply/finalize cycle for a candidate block.

use std::sync::Arc;

use kiln_block::{
    BlockBuilder, CancelCheck, CancellationController, ConsensusEngine, FixedOrderTransactions,
    Interrupt, QuitSignal, TransactionExecutor,
};
use kiln_chainspec::hardfork::KilnHardforks;
use kiln_primitives::{BuiltBlock, CandidateBlock};
use kiln_state::{StateChangeset, StateProvider, StateWriter};
use tracing::{debug, info, warn};

use crate::{
    config::MiningExecConfig,
    error::MiningError,
    fetch::fetch_next_transactions,
    filter::{BadTransactionFilter, TransactionFilter},
    notify::{PendingLogsNotifier, notify_pending_logs},
    pool::TransactionPool,
    progress::ProgressStore,
};

/// Shared handle to a pending logs notifier.
pub type SharedNotifier = Arc<dyn PendingLogsNotifier + Send + Sync>;

/// Builds a block from the pool: fetches batches, applies them, finalizes the result and records
/// the execution progress.
pub struct MiningExecStage<C, E, Eng, Pool> {
    /// Stage settings.
    config: MiningExecConfig,
    /// Chain the block is built for.
    chain_spec: C,
    /// Transaction execution engine.
    executor: E,
    /// Consensus engine used for pre-processing and finalization.
    engine: Eng,
    /// Source of transactions.
    pool: Pool,
    /// Receiver of the pending logs, if any.
    notifier: Option<SharedNotifier>,
    /// Stop request of the block consumer.
    interrupt: Option<Interrupt>,
    /// Process shutdown signal.
    quit: Option<QuitSignal>,
}

impl<C, E, Eng, Pool> core::fmt::Debug for MiningExecStage<C, E, Eng, Pool> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MiningExecStage")
            .field("config", &self.config)
            .field("notifier", &self.notifier.is_some())
            .field("interrupt", &self.interrupt)
            .field("quit", &self.quit)
            .finish_non_exhaustive()
    }
}

impl<C, E, Eng, Pool> MiningExecStage<C, E, Eng, Pool>
where
    C: KilnHardforks,
    E: TransactionExecutor,
    Eng: ConsensusEngine,
    Pool: TransactionPool,
{
    /// Creates a stage without notifier or cancellation signals.
    pub const fn new(
        config: MiningExecConfig,
        chain_spec: C,
        executor: E,
        engine: Eng,
        pool: Pool,
    ) -> Self {
        Self { config, chain_spec, executor, engine, pool, notifier: None, interrupt: None, quit: None }
    }

    /// Sets the pending logs notifier.
    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the interrupt flag raised by the block consumer.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Sets the process shutdown signal.
    pub fn with_quit(mut self, quit: QuitSignal) -> Self {
        self.quit = Some(quit);
        self
    }

    /// Returns the stage settings.
    pub const fn config(&self) -> &MiningExecConfig {
        &self.config
    }

    /// Builds `block` on top of `provider`, screening pool transactions with a
    /// [`BadTransactionFilter`] simulating on the same parent state.
    pub fn run<P, W, S>(
        &self,
        block: CandidateBlock,
        provider: P,
        writer: W,
        progress: &mut S,
    ) -> Result<BuiltBlock, MiningError>
    where
        P: StateProvider + Clone,
        W: StateWriter,
        S: ProgressStore,
    {
        let filter = BadTransactionFilter::new(provider.clone());
        self.run_with_filter(block, provider, filter, writer, progress)
    }

    /// Builds `block` on top of `provider`, screening pool transactions with `filter`.
    ///
    /// The returned block is finalized and its state persisted through `writer`. On error nothing
    /// is persisted and the progress is left untouched.
    pub fn run_with_filter<P, F, W, S>(
        &self,
        block: CandidateBlock,
        provider: P,
        mut filter: F,
        writer: W,
        progress: &mut S,
    ) -> Result<BuiltBlock, MiningError>
    where
        P: StateProvider,
        F: TransactionFilter,
        W: StateWriter,
        S: ProgressStore,
    {
        let number = block.number();
        let execution_at = progress.execution_progress().map_err(MiningError::ReadProgress)?;
        debug!(target: "payload_builder", number, execution_at, gas_limit = block.header.gas_limit, "building block");

        let mut builder = BlockBuilder::new(&self.chain_spec, &self.executor, block, provider)
            .with_min_tx_gas(self.config.min_tx_gas);
        builder.apply_pre_execution_changes(&self.engine)?;

        let mut cancel = self.cancellation();

        if !self.config.noempty {
            info!(target: "payload_builder", number, "committing an empty block");
        } else if let Some(prepared) = builder.take_prepared_transactions() {
            // Pre-supplied transactions replace the pool entirely.
            builder.execute_transactions(FixedOrderTransactions::new(prepared), &mut cancel)?;
        } else {
            let chain_id = self.chain_spec.chain_id();
            let mut rounds = 0;
            loop {
                if cancel.poll()? == CancelCheck::Expired {
                    break;
                }

                let batch = fetch_next_transactions(
                    &self.pool,
                    &mut filter,
                    &self.config,
                    chain_id,
                    &builder.block().header,
                    execution_at,
                )?;
                if batch.is_empty() {
                    break;
                }

                let before = builder.tx_count();
                let outcome = builder.execute_transactions(batch, &mut cancel)?;
                debug!(
                    target: "payload_builder",
                    count = builder.tx_count() - before,
                    gas_remaining = builder.block().gas_remaining(),
                    ?outcome,
                    "added transactions to mining block"
                );
                if outcome.is_terminal() {
                    break;
                }

                rounds += 1;
                if rounds >= self.config.kill_switch {
                    debug!(target: "payload_builder", rounds, "mining exec kill switch limit hit");
                    break;
                }
            }
        }

        info!(
            target: "payload_builder",
            number,
            count = builder.tx_count(),
            gas_used = builder.block().header.gas_used,
            "mined transactions"
        );

        let logs = builder.take_pending_logs();
        let (built, changes) = builder.seal(&self.engine)?;
        persist(number, execution_at, &changes, writer, progress)?;

        notify_pending_logs(self.notifier.as_deref(), &logs);

        Ok(built)
    }

    /// Creates the cancellation controller of one run.
    fn cancellation(&self) -> CancellationController {
        let mut cancel = CancellationController::new(self.config.interrupt_grace_period);
        if let Some(interrupt) = &self.interrupt {
            cancel = cancel.with_interrupt(interrupt.clone());
        }
        if let Some(quit) = &self.quit {
            cancel = cancel.with_quit(quit.clone());
        }
        cancel
    }
}

/// Records `number` as executed and persists the block state, both or neither.
///
/// Progress goes first so a failure there leaves the state untouched. If the state write fails
/// the progress is set back to `execution_at`.
fn persist<W, S>(
    number: u64,
    execution_at: u64,
    changes: &StateChangeset,
    mut writer: W,
    progress: &mut S,
) -> Result<(), MiningError>
where
    W: StateWriter,
    S: ProgressStore,
{
    // Later stages rely on the execution progress, report the mined block as executed.
    progress
        .save_execution_progress(number)
        .map_err(|source| MiningError::SaveProgress { block_number: number, source })?;

    if let Err(source) = writer.write_state(number, changes) {
        if let Err(err) = progress.save_execution_progress(execution_at) {
            warn!(target: "payload_builder", number, execution_at, %err, "failed to restore execution progress");
        }
        return Err(MiningError::Persist { block_number: number, source });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{PoolError, ProgressError},
        filter::NoopFilter,
        pool::{BestReady, PooledTransaction},
        progress::InMemoryProgress,
    };
    use alloy_consensus::Header;
    use alloy_eips::Encodable2718;
    use alloy_primitives::{Address, Bytes, Log};
    use kiln_block::{
        BlockBuildError,
        test_utils::{MockConsensus, TransferExecutor, legacy_transfer, sign_legacy, transfer},
    };
    use kiln_chainspec::{KILN_DEV, spec::KilnChainSpec};
    use kiln_primitives::PendingTransaction;
    use kiln_state::{Account, InMemoryState, StateError};
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);

    /// Serves scripted answers, then repeats the last one.
    #[derive(Default)]
    struct ScriptedPool {
        answers: Mutex<VecDeque<Vec<PooledTransaction>>>,
        last: Mutex<Vec<PooledTransaction>>,
        calls: AtomicUsize,
    }

    impl ScriptedPool {
        fn new(answers: Vec<Vec<PendingTransaction>>) -> Self {
            let answers = answers
                .into_iter()
                .map(|batch| {
                    batch
                        .into_iter()
                        .map(|tx| {
                            PooledTransaction::new(
                                tx.tx().encoded_2718().into(),
                                tx.sender().unwrap(),
                            )
                        })
                        .collect()
                })
                .collect();
            Self { answers: Mutex::new(answers), ..Default::default() }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::Relaxed)
        }
    }

    impl TransactionPool for ScriptedPool {
        fn best_ready(&self, _: u16, _: u64, _: u64) -> Result<BestReady, PoolError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.answers.lock().unwrap().pop_front() {
                *last = next;
            }
            Ok(BestReady { transactions: last.clone(), complete: true })
        }
    }

    struct BrokenPool;

    impl TransactionPool for BrokenPool {
        fn best_ready(&self, _: u16, _: u64, _: u64) -> Result<BestReady, PoolError> {
            Err(PoolError::new("pool unavailable"))
        }
    }

    struct BrokenProgress;

    impl ProgressStore for BrokenProgress {
        fn execution_progress(&self) -> Result<u64, ProgressError> {
            Ok(4)
        }

        fn save_execution_progress(&mut self, _: u64) -> Result<(), ProgressError> {
            Err(ProgressError::new("read-only database"))
        }
    }

    struct BrokenWriter;

    impl StateWriter for BrokenWriter {
        fn write_state(&mut self, block_number: u64, _: &StateChangeset) -> Result<(), StateError> {
            Err(StateError::write(block_number, "disk full"))
        }
    }

    /// Records the logs it receives and how many blocks the engine had finalized at that time.
    struct Recorder {
        engine: Arc<MockConsensus>,
        batches: Mutex<Vec<(usize, usize)>>,
    }

    impl PendingLogsNotifier for Recorder {
        fn on_new_pending_logs(&self, logs: &[Log]) {
            self.batches.lock().unwrap().push((logs.len(), self.engine.finalized().len()));
        }
    }

    type TestStage<Pool> =
        MiningExecStage<Arc<KilnChainSpec>, TransferExecutor, Arc<MockConsensus>, Pool>;

    fn stage<Pool: TransactionPool>(config: MiningExecConfig, pool: Pool) -> TestStage<Pool> {
        stage_with(config, TransferExecutor::default(), pool)
    }

    fn stage_with<Pool: TransactionPool>(
        config: MiningExecConfig,
        executor: TransferExecutor,
        pool: Pool,
    ) -> TestStage<Pool> {
        MiningExecStage::new(config, KILN_DEV.clone(), executor, Arc::default(), pool)
    }

    fn config() -> MiningExecConfig {
        MiningExecConfig::default().with_pool_poll_interval(Duration::ZERO)
    }

    fn parent_state() -> InMemoryState {
        InMemoryState::default()
            .with_account(ALICE, Account::new(5, alloy_primitives::U256::from(10u128.pow(18))))
            .with_account(BOB, Account::new(0, alloy_primitives::U256::from(10u128.pow(18))))
    }

    fn candidate(gas_limit: u64) -> CandidateBlock {
        CandidateBlock::new(Header { number: 5, gas_limit, ..Default::default() })
    }

    fn with_input(sender: Address, nonce: u64) -> PendingTransaction {
        let mut tx = legacy_transfer(nonce, BOB, 1);
        tx.gas_limit = 50_000;
        tx.input = Bytes::from_static(b"hello");
        PendingTransaction::with_sender(sign_legacy(tx), sender)
    }

    fn senders_and_nonces(block: &BuiltBlock) -> Vec<(Address, u64)> {
        use alloy_consensus::Transaction;
        block.senders().iter().copied().zip(block.transactions().iter().map(|tx| tx.nonce())).collect()
    }

    #[test]
    fn test_builds_block_from_pool_batches() {
        let pool = ScriptedPool::new(vec![
            vec![transfer(ALICE, 5, BOB, 1), with_input(ALICE, 6)],
            vec![with_input(ALICE, 7)],
            vec![],
        ]);
        let stage = stage(config(), pool);
        let recorder = Arc::new(Recorder { engine: stage.engine.clone(), batches: Mutex::default() });
        let stage = stage.with_notifier(recorder.clone());
        let parent = parent_state();
        let mut db = parent.clone();
        let mut progress = InMemoryProgress::new(4);

        let built = stage.run(candidate(30_000_000), &parent, &mut db, &mut progress).unwrap();

        assert_eq!(senders_and_nonces(&built), vec![(ALICE, 5), (ALICE, 6), (ALICE, 7)]);
        assert_eq!(stage.pool.calls(), 3);
        assert_eq!(progress.execution_progress().unwrap(), 5);
        assert_eq!(db.last_written_block(), Some(5));
        assert_eq!(db.account(&ALICE).unwrap().nonce, 8);
        assert_eq!(stage.engine.initialized(), 1);
        // One notification carrying both logs, sent after finalization.
        assert_eq!(*recorder.batches.lock().unwrap(), vec![(2, 1)]);
    }

    #[test]
    fn test_single_transaction_fills_block() {
        let pool = ScriptedPool::new(vec![vec![transfer(ALICE, 5, BOB, 1)]]);
        let stage = stage(config(), pool);
        let parent = parent_state();

        let built = stage
            .run(candidate(21_000), &parent, InMemoryState::default(), &mut InMemoryProgress::new(4))
            .unwrap();

        assert_eq!(built.transactions().len(), 1);
        assert_eq!(built.gas_used(), 21_000);
        // Out of gas after the first batch, the pool is not asked again.
        assert_eq!(stage.pool.calls(), 1);
    }

    #[test]
    fn test_nonce_gap_sender_is_dropped_then_resumed() {
        let pool = ScriptedPool::new(vec![
            vec![transfer(ALICE, 6, BOB, 1), transfer(BOB, 0, ALICE, 1)],
            vec![transfer(ALICE, 5, BOB, 1)],
            vec![],
        ]);
        let stage = stage(config(), pool);
        let parent = parent_state();

        let built = stage
            .run_with_filter(
                candidate(30_000_000),
                &parent,
                NoopFilter,
                InMemoryState::default(),
                &mut InMemoryProgress::new(4),
            )
            .unwrap();

        assert_eq!(senders_and_nonces(&built), vec![(BOB, 0), (ALICE, 5)]);
    }

    #[test]
    fn test_bad_transaction_filter_screens_nonce_gap() {
        let pool = ScriptedPool::new(vec![vec![transfer(ALICE, 6, BOB, 1), transfer(ALICE, 5, BOB, 1)], vec![]]);
        let stage = stage(config(), pool);
        let parent = parent_state();

        let built = stage
            .run(candidate(30_000_000), &parent, InMemoryState::default(), &mut InMemoryProgress::new(4))
            .unwrap();

        assert_eq!(senders_and_nonces(&built), vec![(ALICE, 5)]);
    }

    #[test]
    fn test_kill_switch_bounds_rounds() {
        // A stale transaction the pool keeps handing out.
        let pool = ScriptedPool::new(vec![vec![transfer(ALICE, 1, BOB, 1)]]);
        let stage = stage(config().with_kill_switch(5), pool);
        let parent = parent_state();

        let built = stage
            .run_with_filter(
                candidate(30_000_000),
                &parent,
                NoopFilter,
                InMemoryState::default(),
                &mut InMemoryProgress::new(4),
            )
            .unwrap();

        assert!(built.transactions().is_empty());
        assert_eq!(stage.pool.calls(), 5);
    }

    #[test]
    fn test_interrupt_mid_batch_finalizes_partial_block() {
        let interrupt = Interrupt::new();
        let executor = TransferExecutor::default().interrupt_after(4, interrupt.clone());
        let pool = ScriptedPool::new(vec![(5..15).map(|nonce| transfer(ALICE, nonce, BOB, 1)).collect()]);
        let stage = stage_with(config().with_interrupt_grace_period(Duration::ZERO), executor, pool)
            .with_interrupt(interrupt);
        let parent = parent_state();
        let mut progress = InMemoryProgress::new(4);

        let built =
            stage.run(candidate(30_000_000), &parent, InMemoryState::default(), &mut progress).unwrap();

        assert_eq!(built.transactions().len(), 4);
        assert_eq!(stage.pool.calls(), 1);
        assert_eq!(progress.execution_progress().unwrap(), 5);
    }

    #[test]
    fn test_quit_aborts_without_persisting() {
        let quit = QuitSignal::new();
        quit.quit();
        let stage = stage(config(), ScriptedPool::default()).with_quit(quit);
        let parent = parent_state();
        let mut db = InMemoryState::default();
        let mut progress = InMemoryProgress::new(4);

        let err = stage.run(candidate(30_000_000), &parent, &mut db, &mut progress).unwrap_err();

        assert!(matches!(err, MiningError::Build(BlockBuildError::Stopped)));
        assert_eq!(db.last_written_block(), None);
        assert_eq!(progress.execution_progress().unwrap(), 4);
    }

    #[test]
    fn test_noempty_disabled_seals_empty_block() {
        let pool = ScriptedPool::new(vec![vec![transfer(ALICE, 5, BOB, 1)]]);
        let stage = stage(config().with_noempty(false), pool);
        let parent = parent_state();
        let mut progress = InMemoryProgress::new(4);

        let built =
            stage.run(candidate(30_000_000), &parent, InMemoryState::default(), &mut progress).unwrap();

        assert!(built.transactions().is_empty());
        assert_eq!(stage.pool.calls(), 0);
        assert_eq!(stage.engine.finalized(), vec![5]);
        assert_eq!(progress.execution_progress().unwrap(), 5);
    }

    #[test]
    fn test_prepared_transactions_bypass_pool() {
        let pool = ScriptedPool::new(vec![vec![transfer(BOB, 0, ALICE, 1)]]);
        let stage = stage(config(), pool);
        let parent = parent_state();
        let block = candidate(30_000_000)
            .with_prepared_transactions(vec![transfer(ALICE, 5, BOB, 1), transfer(ALICE, 6, BOB, 1)]);

        let built = stage
            .run(block, &parent, InMemoryState::default(), &mut InMemoryProgress::new(4))
            .unwrap();

        assert_eq!(senders_and_nonces(&built), vec![(ALICE, 5), (ALICE, 6)]);
        assert_eq!(stage.pool.calls(), 0);
    }

    #[test]
    fn test_pool_failure_is_fatal() {
        let parent = parent_state();
        let mut db = InMemoryState::default();
        let mut progress = InMemoryProgress::new(4);

        let err = stage(config(), BrokenPool)
            .run(candidate(30_000_000), &parent, &mut db, &mut progress)
            .unwrap_err();

        assert!(matches!(err, MiningError::Pool { block_number: 5, .. }));
        assert_eq!(db.last_written_block(), None);
        assert_eq!(progress.execution_progress().unwrap(), 4);
    }

    #[test]
    fn test_progress_failure_persists_nothing() {
        let pool = ScriptedPool::new(vec![vec![transfer(ALICE, 5, BOB, 1)], vec![]]);
        let parent = parent_state();
        let mut db = parent.clone();

        let err = stage(config(), pool)
            .run(candidate(30_000_000), &parent, &mut db, &mut BrokenProgress)
            .unwrap_err();

        assert!(matches!(err, MiningError::SaveProgress { block_number: 5, .. }));
        assert_eq!(db.last_written_block(), None);
        assert_eq!(db.account(&ALICE).unwrap().nonce, 5);
    }

    #[test]
    fn test_state_write_failure_restores_progress() {
        let pool = ScriptedPool::new(vec![vec![transfer(ALICE, 5, BOB, 1)], vec![]]);
        let parent = parent_state();
        let mut progress = InMemoryProgress::new(4);

        let err = stage(config(), pool)
            .run(candidate(30_000_000), &parent, BrokenWriter, &mut progress)
            .unwrap_err();

        assert!(matches!(err, MiningError::Persist { block_number: 5, .. }));
        assert_eq!(progress.execution_progress().unwrap(), 4);
    }
}
