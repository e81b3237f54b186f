//! Block finalization: protocol post-processing, root computation and sealing.

use alloy_consensus::{
    Block, BlockBody, Header, ReceiptEnvelope, TxEnvelope, TxReceipt, proofs,
    transaction::Recovered,
};
use alloy_eips::{
    Encodable2718,
    eip4895::{Withdrawal, Withdrawals},
};
use alloy_primitives::{Address, B256, U256, logs_bloom};
use kiln_primitives::{BuiltBlock, CandidateBlock};
use kiln_state::{IntraBlockState, StateChangeset, StateError, StateProvider, StateWriter};
use tracing::debug;

use crate::error::{BlockBuildError, ConsensusError};

/// Multiplier converting withdrawal amounts (gwei) to wei.
const GWEI_TO_WEI: u64 = 1_000_000_000;

/// Everything the consensus engine sees when finalizing a block.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeInput<'a> {
    /// Header with `gas_used` already final.
    pub header: &'a Header,
    /// Included transactions.
    pub transactions: &'a [Recovered<TxEnvelope>],
    /// Receipts of the included transactions.
    pub receipts: &'a [ReceiptEnvelope],
    /// Ommer headers.
    pub ommers: &'a [Header],
    /// Withdrawals to process, post-Shanghai.
    pub withdrawals: Option<&'a [Withdrawal]>,
}

/// Roots computed by the consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// State root after post-processing.
    pub state_root: B256,
    /// Receipts root.
    pub receipts_root: B256,
}

/// Consensus rules applied around transaction execution.
#[auto_impl::auto_impl(&, Arc)]
pub trait ConsensusEngine {
    /// Applies changes that precede the first transaction, such as system contract upgrades.
    fn initialize<P: StateProvider>(
        &self,
        _header: &Header,
        _state: &mut IntraBlockState<P>,
    ) -> Result<(), ConsensusError> {
        Ok(())
    }

    /// Applies the irregular state change of the DAO fork block.
    fn apply_dao_fork<P: StateProvider>(
        &self,
        _state: &mut IntraBlockState<P>,
    ) -> Result<(), ConsensusError> {
        Ok(())
    }

    /// Applies block rewards and withdrawals and computes the state and receipts roots.
    fn finalize<P: StateProvider>(
        &self,
        input: FinalizeInput<'_>,
        state: &mut IntraBlockState<P>,
    ) -> Result<FinalizeOutcome, ConsensusError>;
}

/// Computes the receipts root of `receipts`.
pub fn calculate_receipts_root(receipts: &[ReceiptEnvelope]) -> B256 {
    proofs::ordered_trie_root_with_encoder(receipts, |receipt, buf| receipt.encode_2718(buf))
}

/// Credits every withdrawal to its recipient (EIP-4895).
pub fn apply_withdrawals<P: StateProvider>(
    state: &mut IntraBlockState<P>,
    withdrawals: &[Withdrawal],
) -> Result<(), StateError> {
    for withdrawal in withdrawals {
        if withdrawal.amount == 0 {
            continue;
        }
        let amount = U256::from(withdrawal.amount) * U256::from(GWEI_TO_WEI);
        state.add_balance(withdrawal.address, amount)?;
    }
    Ok(())
}

/// Moves the whole balance of every account in `drained` to `beneficiary`.
pub fn drain_balances<P: StateProvider>(
    state: &mut IntraBlockState<P>,
    drained: &[Address],
    beneficiary: Address,
) -> Result<(), StateError> {
    for address in drained {
        let balance = state.balance(address)?;
        if balance.is_zero() {
            continue;
        }
        if state.checked_sub_balance(*address, balance)? {
            state.add_balance(beneficiary, balance)?;
        }
    }
    Ok(())
}

/// Finalizes `block` and persists its state changeset through `writer`.
pub fn finalize_block<P, Eng, W>(
    block: CandidateBlock,
    state: IntraBlockState<P>,
    engine: &Eng,
    mut writer: W,
) -> Result<BuiltBlock, BlockBuildError>
where
    P: StateProvider,
    Eng: ConsensusEngine,
    W: StateWriter,
{
    let (built, changes) = seal_block(block, state, engine)?;
    writer.write_state(built.number(), &changes)?;
    Ok(built)
}

/// Runs the engine post-processing, fills the header roots and seals `block`.
///
/// Nothing is persisted. The returned changeset holds every state write of the block, including
/// the post-processing ones.
pub fn seal_block<P, Eng>(
    block: CandidateBlock,
    mut state: IntraBlockState<P>,
    engine: &Eng,
) -> Result<(BuiltBlock, StateChangeset), BlockBuildError>
where
    P: StateProvider,
    Eng: ConsensusEngine,
{
    let (mut header, transactions, receipts, ommers, withdrawals) = block.into_parts();
    let number = header.number;

    let FinalizeOutcome { state_root, receipts_root } = engine
        .finalize(
            FinalizeInput {
                header: &header,
                transactions: &transactions,
                receipts: &receipts,
                ommers: &ommers,
                withdrawals: withdrawals.as_deref(),
            },
            &mut state,
        )
        .map_err(|source| BlockBuildError::Finalize { number, source })?;

    let (transactions, senders): (Vec<_>, Vec<_>) =
        transactions.into_iter().map(Recovered::into_parts).unzip();

    header.state_root = state_root;
    header.receipts_root = receipts_root;
    header.transactions_root = proofs::calculate_transaction_root(&transactions);
    header.ommers_hash = proofs::calculate_ommers_root(&ommers);
    header.withdrawals_root = withdrawals.as_deref().map(proofs::calculate_withdrawals_root);
    header.logs_bloom = logs_bloom(receipts.iter().flat_map(|receipt| receipt.logs()));

    let body = BlockBody { transactions, ommers, withdrawals: withdrawals.map(Withdrawals::new) };
    let built = BuiltBlock::new(Block::new(header, body), senders, receipts);

    debug!(
        target: "payload_builder",
        number,
        hash = %built.hash(),
        transactions = built.transactions().len(),
        gas_used = built.gas_used(),
        "finalized block"
    );

    Ok((built, state.changeset()))
}
