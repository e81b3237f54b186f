//! Pulling batches of ready transactions out of the pool.

use std::thread;

use alloy_consensus::{Header, Transaction, TxEnvelope};
use alloy_eips::Decodable2718;
use kiln_block::FixedOrderTransactions;
use kiln_primitives::PendingTransaction;
use tracing::trace;

use crate::{
    config::MiningExecConfig,
    error::{MiningError, PoolError},
    filter::{FilterContext, TransactionFilter},
    pool::{BestReady, TransactionPool},
};

/// Fetches the next batch of transactions for the block described by `header`.
///
/// The pool is polled until it reports a complete answer or `max_pool_polls` is reached, sleeping
/// `pool_poll_interval` after every incomplete answer. The last answer is decoded, transactions
/// bound to another chain are dropped and the rest goes through `filter`.
pub fn fetch_next_transactions<Pool, F>(
    pool: &Pool,
    filter: &mut F,
    config: &MiningExecConfig,
    chain_id: u64,
    header: &Header,
    execution_at: u64,
) -> Result<FixedOrderTransactions, MiningError>
where
    Pool: TransactionPool,
    F: TransactionFilter,
{
    let remaining_gas = header.gas_limit.saturating_sub(header.gas_used);
    let batch = poll_best_ready(pool, config, remaining_gas, execution_at)
        .map_err(|source| MiningError::Pool { block_number: header.number, source })?;

    let mut transactions = Vec::with_capacity(batch.transactions.len());
    for (index, pooled) in batch.transactions.into_iter().enumerate() {
        // Exhausted input, nothing to decode.
        if pooled.rlp.is_empty() {
            continue;
        }
        let tx = TxEnvelope::decode_2718(&mut pooled.rlp.as_ref())
            .map_err(|source| MiningError::Decode { index, source })?;

        if let Some(tx_chain_id) = tx.chain_id()
            && tx_chain_id != 0
            && tx_chain_id != chain_id
        {
            trace!(target: "tx_selection", hash = %tx.tx_hash(), tx_chain_id, chain_id, "dropping transaction for another chain");
            continue;
        }

        transactions.push(PendingTransaction::with_sender(tx, pooled.sender));
    }

    let ctx = FilterContext { block_number: execution_at + 1, base_fee: header.base_fee_per_gas };
    let transactions = filter.filter(transactions, ctx).map_err(MiningError::Filter)?;

    Ok(FixedOrderTransactions::new(transactions))
}

/// Polls the pool until its answer is complete or the poll ceiling is hit.
fn poll_best_ready<Pool: TransactionPool>(
    pool: &Pool,
    config: &MiningExecConfig,
    remaining_gas: u64,
    execution_at: u64,
) -> Result<BestReady, PoolError> {
    let max_polls = config.max_pool_polls.max(1);
    let mut polls = 0;
    loop {
        let batch = pool.best_ready(config.batch_size, remaining_gas, execution_at)?;
        polls += 1;
        if batch.complete || polls >= max_polls {
            trace!(target: "tx_selection", polls, complete = batch.complete, count = batch.transactions.len(), "pool answered");
            return Ok(batch);
        }
        thread::sleep(config.pool_poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{filter::NoopFilter, pool::PooledTransaction};
    use alloy_eips::Encodable2718;
    use alloy_primitives::{Address, Bytes};
    use kiln_block::{TransactionStream, test_utils::{legacy_transfer, sign_legacy}};
    use std::sync::atomic::{AtomicU32, Ordering};

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);

    /// Answers incomplete until the `ready_after`-th poll.
    struct SlowPool {
        transactions: Vec<PooledTransaction>,
        ready_after: u32,
        polls: AtomicU32,
    }

    impl SlowPool {
        fn new(transactions: Vec<PooledTransaction>, ready_after: u32) -> Self {
            Self { transactions, ready_after, polls: AtomicU32::new(0) }
        }
    }

    impl TransactionPool for SlowPool {
        fn best_ready(&self, max_count: u16, _: u64, _: u64) -> Result<BestReady, PoolError> {
            let polls = self.polls.fetch_add(1, Ordering::Relaxed) + 1;
            let complete = polls >= self.ready_after;
            let visible = if complete { self.transactions.len() } else { 1.min(self.transactions.len()) };
            Ok(BestReady {
                transactions: self.transactions.iter().take(visible.min(max_count as usize)).cloned().collect(),
                complete,
            })
        }
    }

    struct BrokenPool;

    impl TransactionPool for BrokenPool {
        fn best_ready(&self, _: u16, _: u64, _: u64) -> Result<BestReady, PoolError> {
            Err(PoolError::new("pool database closed"))
        }
    }

    fn pooled(nonce: u64, chain_id: Option<u64>) -> PooledTransaction {
        let mut tx = legacy_transfer(nonce, BOB, 1);
        tx.chain_id = chain_id;
        PooledTransaction::new(sign_legacy(tx).encoded_2718().into(), ALICE)
    }

    fn header() -> Header {
        Header { number: 8, gas_limit: 30_000_000, ..Default::default() }
    }

    fn config() -> MiningExecConfig {
        MiningExecConfig::default().with_pool_poll_interval(std::time::Duration::ZERO)
    }

    fn drain(mut stream: FixedOrderTransactions) -> Vec<(Address, u64)> {
        let mut seen = Vec::new();
        while let Some(tx) = stream.peek() {
            seen.push((tx.sender().unwrap(), tx.nonce()));
            stream.shift();
        }
        seen
    }

    #[test]
    fn test_polls_until_pool_is_complete() {
        let pool = SlowPool::new(vec![pooled(0, Some(1337)), pooled(1, Some(1337))], 5);

        let stream =
            fetch_next_transactions(&pool, &mut NoopFilter, &config(), 1337, &header(), 7).unwrap();

        assert_eq!(pool.polls.load(Ordering::Relaxed), 5);
        assert_eq!(drain(stream), vec![(ALICE, 0), (ALICE, 1)]);
    }

    #[test]
    fn test_poll_ceiling_proceeds_with_partial_answer() {
        let pool = SlowPool::new(vec![pooled(0, Some(1337)), pooled(1, Some(1337))], u32::MAX);
        let config = config().with_max_pool_polls(3);

        let stream =
            fetch_next_transactions(&pool, &mut NoopFilter, &config, 1337, &header(), 7).unwrap();

        assert_eq!(pool.polls.load(Ordering::Relaxed), 3);
        assert_eq!(drain(stream), vec![(ALICE, 0)]);
    }

    #[test]
    fn test_foreign_chain_and_empty_payloads_are_dropped() {
        let pool = SlowPool::new(
            vec![
                pooled(0, Some(1)),
                PooledTransaction::new(Bytes::new(), ALICE),
                pooled(1, None),
                pooled(2, Some(1337)),
            ],
            1,
        );

        let stream =
            fetch_next_transactions(&pool, &mut NoopFilter, &config(), 1337, &header(), 7).unwrap();

        assert_eq!(drain(stream), vec![(ALICE, 1), (ALICE, 2)]);
    }

    #[test]
    fn test_undecodable_transaction_aborts_fetch() {
        let pool = SlowPool::new(
            vec![pooled(0, Some(1337)), PooledTransaction::new(Bytes::from_static(&[0x7f, 0x01]), ALICE)],
            1,
        );

        let err = fetch_next_transactions(&pool, &mut NoopFilter, &config(), 1337, &header(), 7)
            .unwrap_err();

        assert!(matches!(err, MiningError::Decode { index: 1, .. }));
    }

    #[test]
    fn test_pool_failure_is_fatal() {
        let err = fetch_next_transactions(&BrokenPool, &mut NoopFilter, &config(), 1337, &header(), 7)
            .unwrap_err();

        assert!(matches!(err, MiningError::Pool { block_number: 8, .. }));
    }
}
