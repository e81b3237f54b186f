//! Receipt construction for committed transactions.

use alloy_consensus::{Eip658Value, Receipt, ReceiptEnvelope, ReceiptWithBloom, TxType};
use alloy_primitives::{Log, logs_bloom};

/// Builds the typed receipt of a committed transaction.
///
/// `cumulative_gas_used` is the block gas used including this transaction.
pub fn build_receipt(
    tx_type: TxType,
    success: bool,
    cumulative_gas_used: u64,
    logs: Vec<Log>,
) -> ReceiptEnvelope {
    let logs_bloom = logs_bloom(logs.iter());
    // Success flag was added in `EIP-658: Embedding transaction status code in receipts`.
    let receipt = Receipt { status: Eip658Value::Eip658(success), cumulative_gas_used, logs };
    let receipt = ReceiptWithBloom { receipt, logs_bloom };

    match tx_type {
        TxType::Legacy => ReceiptEnvelope::Legacy(receipt),
        TxType::Eip2930 => ReceiptEnvelope::Eip2930(receipt),
        TxType::Eip1559 => ReceiptEnvelope::Eip1559(receipt),
        TxType::Eip4844 => ReceiptEnvelope::Eip4844(receipt),
        TxType::Eip7702 => ReceiptEnvelope::Eip7702(receipt),
    }
}
