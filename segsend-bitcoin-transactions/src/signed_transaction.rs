use bitcoin::{
    consensus::encode::{deserialize, serialize},
    Transaction, Txid, Wtxid,
};

use crate::error::BitcoinTxError;

/// A finalized transaction: every input carries a non-empty witness stack.
///
/// The value is immutable; [`Self::serialize`] yields the canonical segwit v0 wire encoding
/// (version, marker and flag, inputs, outputs, witnesses, lock time).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    transaction: Transaction,
}

impl SignedTransaction {
    pub(crate) fn new(transaction: Transaction) -> Result<Self, BitcoinTxError> {
        if let Some(index) = transaction
            .input
            .iter()
            .position(|input| input.witness.is_empty())
        {
            return Err(BitcoinTxError::FinalizationError {
                index,
                reason: "input has an empty witness".to_string(),
            });
        }

        Ok(Self { transaction })
    }

    /// Parses wire bytes back into a signed transaction.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BitcoinTxError> {
        let transaction: Transaction = deserialize(bytes)
            .map_err(|e| BitcoinTxError::InvalidTransactionEncoding(e.to_string()))?;

        Self::new(transaction)
    }

    pub fn from_hex(raw_hex: &str) -> Result<Self, BitcoinTxError> {
        let bytes = hex::decode(raw_hex.trim())
            .map_err(|e| BitcoinTxError::InvalidTransactionEncoding(e.to_string()))?;

        Self::from_bytes(&bytes)
    }

    pub fn serialize(&self) -> Vec<u8> {
        serialize(&self.transaction)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn txid(&self) -> Txid {
        self.transaction.compute_txid()
    }

    pub fn wtxid(&self) -> Wtxid {
        self.transaction.compute_wtxid()
    }

    pub fn vsize(&self) -> usize {
        self.transaction.vsize()
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}
