//! Segwit v0 transaction helpers for the single-input send pipeline.
//!
//! This crate is the offline half of the pipeline: it owns the key material, picks the coin to
//! spend, builds the unsigned transaction through [`TransactionBuilder`], signs and finalizes it
//! ([`PartiallySignedTransaction`]) and produces the canonical wire bytes
//! ([`SignedTransaction`]). Nothing in here touches the network.
//!
//! The walkthrough below is embedded from the crate README.
#![doc = include_str!("../README.md")]

use bitcoin::{
    absolute::LockTime, psbt::Psbt, transaction::Version, Amount, ScriptBuf, Sequence,
    Transaction, TxIn, TxOut, Witness,
};
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{constants::P2WPKH_DUST_LIMIT, error::BitcoinTxError, utxo_info::UtxoInfo};

pub mod constants;
pub mod error;
pub mod keys;
pub mod selection;
pub mod signed_transaction;
pub mod signer;
pub mod utxo_info;

pub use keys::KeyMaterial;
pub use selection::select_utxo;
pub use signed_transaction::SignedTransaction;
pub use signer::PartiallySignedTransaction;

/// What to do with a positive change amount that is below the dust limit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ChangePolicy {
    /// Emit every positive change amount, dust or not.
    #[default]
    Emit,
    /// Drop change below [`P2WPKH_DUST_LIMIT`]; the dropped amount is paid as extra fee.
    FoldDustIntoFee,
}

/// The payment requested from the builder: who gets paid, how much, and the fixed fee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payment {
    pub destination: ScriptBuf,
    pub amount: u64,
    pub fee: u64,
}

impl Payment {
    /// `amount + fee`, i.e. the smallest UTXO value able to fund this payment.
    pub fn required_value(&self) -> Result<u64, BitcoinTxError> {
        self.amount
            .checked_add(self.fee)
            .ok_or(BitcoinTxError::AmountOverflow)
    }
}

/// A built but unsigned transaction.
///
/// Every input carries the output it spends (value and locking script) as its witness UTXO,
/// which is what the BIP143 signature hash commits to. The invariant
/// `sum(outputs) + fee == sum(inputs)` holds by construction.
#[derive(Clone, Debug, PartialEq)]
pub struct UnsignedTransaction {
    psbt: Psbt,
    fee: u64,
    change_output: Option<usize>,
}

impl UnsignedTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.psbt.unsigned_tx
    }

    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    /// Effective fee in satoshis (the configured fee plus any folded dust).
    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Value of the change output, if one was emitted.
    pub fn change(&self) -> Option<u64> {
        self.change_output
            .map(|index| self.psbt.unsigned_tx.output[index].value.to_sat())
    }

    /// The output spent by input `index`.
    pub fn spent_output(&self, index: usize) -> Option<&TxOut> {
        self.psbt
            .inputs
            .get(index)
            .and_then(|input| input.witness_utxo.as_ref())
    }

    /// Signs input `input_index` and moves into the signing state.
    ///
    /// Further inputs can be signed on the returned value with
    /// [`PartiallySignedTransaction::sign_input`].
    pub fn sign(
        self,
        keys: &KeyMaterial,
        input_index: usize,
    ) -> Result<PartiallySignedTransaction, BitcoinTxError> {
        let mut partially_signed = PartiallySignedTransaction::from(self);
        partially_signed.sign_input(keys, input_index)?;
        Ok(partially_signed)
    }

    pub(crate) fn into_parts(self) -> (Psbt, u64, Option<usize>) {
        (self.psbt, self.fee, self.change_output)
    }
}

#[derive(Debug)]
/// `TransactionBuilder` assembles a segwit v0 [`bitcoin::Transaction`] and keeps the extra
/// metadata needed later for signing: the outputs being spent and their source transactions.
///
/// Most callers only need [`TransactionBuilder::build`], which implements the single-input
/// payment flow. The lower-level `add_*` helpers are public so multi-input transactions can be
/// assembled the same way.
///
/// ```rust
/// use segsend_bitcoin_transactions::TransactionBuilder;
///
/// let builder = TransactionBuilder::new();
/// assert!(builder.transaction.input.is_empty());
/// ```
pub struct TransactionBuilder {
    pub transaction: Transaction,

    /// Output spent by each input, index-aligned with `transaction.input`.
    pub spent_outputs: Vec<TxOut>,

    /// Full transaction each input spends from, index-aligned with `transaction.input`.
    pub source_transactions: Vec<Transaction>,

    pub total_btc_input: u64,

    change_output: Option<usize>,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionBuilder {
    /// Constructs a blank builder containing an empty **version 2** transaction with `lock_time = 0`.
    pub fn new() -> Self {
        let transaction = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![],
        };

        Self {
            transaction,
            spent_outputs: vec![],
            source_transactions: vec![],
            total_btc_input: 0,
            change_output: None,
        }
    }

    /// Builds the unsigned transaction paying `payment` out of `selected`.
    ///
    /// 1. `change = selected.value - payment.amount - payment.fee`; a negative change fails with
    ///    [`BitcoinTxError::InsufficientFunds`].
    /// 2. One input spending `selected`, carrying the spent output from `source_tx`.
    /// 3. One output paying `payment.amount` to `payment.destination`.
    /// 4. A change output to `change_script` when `change > 0` (subject to `change_policy`).
    ///
    /// # Errors
    /// * [`BitcoinTxError::InsufficientFunds`] – the UTXO does not cover amount plus fee.
    /// * [`BitcoinTxError::SourceTransactionMismatch`] – `source_tx` is not the transaction that
    ///   created `selected`.
    /// * [`BitcoinTxError::UnsupportedSpendScript`] – the spent output is not P2WPKH.
    pub fn build(
        selected: &UtxoInfo,
        source_tx: &Transaction,
        payment: &Payment,
        change_script: ScriptBuf,
        change_policy: ChangePolicy,
    ) -> Result<UnsignedTransaction, BitcoinTxError> {
        let required = payment.required_value()?;
        if selected.value < required {
            return Err(BitcoinTxError::InsufficientFunds {
                required,
                available: selected.value,
            });
        }

        let mut builder = Self::new();
        builder.add_tx_input(selected, source_tx)?;
        builder.add_tx_output(payment.destination.clone(), payment.amount);
        builder.add_change_output(change_script, payment.fee, change_policy)?;

        builder.finalize()
    }

    /// Adds an input spending `utxo`.
    ///
    /// `source_tx` must be the transaction that created `utxo`: its txid, the referenced output
    /// and that output's value are checked against the indexer data before anything is added.
    pub fn add_tx_input(
        &mut self,
        utxo: &UtxoInfo,
        source_tx: &Transaction,
    ) -> Result<(), BitcoinTxError> {
        let outpoint = utxo.outpoint();
        let mismatch = |reason: String| BitcoinTxError::SourceTransactionMismatch {
            outpoint,
            reason,
        };

        let source_txid = source_tx.compute_txid();
        if source_txid != utxo.txid {
            return Err(mismatch(format!("source transaction has txid {}", source_txid)));
        }

        let spent_output = source_tx
            .output
            .get(utxo.vout as usize)
            .ok_or_else(|| {
                mismatch(format!(
                    "source transaction has only {} outputs",
                    source_tx.output.len()
                ))
            })?;

        if spent_output.value.to_sat() != utxo.value {
            return Err(mismatch(format!(
                "output value is {} sats, indexer reported {} sats",
                spent_output.value.to_sat(),
                utxo.value
            )));
        }

        if !spent_output.script_pubkey.is_p2wpkh() {
            return Err(BitcoinTxError::UnsupportedSpendScript(
                spent_output.script_pubkey.clone(),
            ));
        }

        self.total_btc_input = self
            .total_btc_input
            .checked_add(utxo.value)
            .ok_or(BitcoinTxError::AmountOverflow)?;

        self.transaction.input.push(TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        });
        self.spent_outputs.push(spent_output.clone());
        self.source_transactions.push(source_tx.clone());

        debug!(utxo = %utxo, value = utxo.value, "added transaction input");

        Ok(())
    }

    pub fn add_tx_output(&mut self, script_pubkey: ScriptBuf, value: u64) {
        self.transaction.output.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        });
    }

    /// Sum of all output values.
    pub fn get_total_output(&self) -> Result<u64, BitcoinTxError> {
        self.transaction
            .output
            .iter()
            .try_fold(0u64, |total, output| total.checked_add(output.value.to_sat()))
            .ok_or(BitcoinTxError::AmountOverflow)
    }

    /// Calculates the fee currently paid by the partially-built transaction (`inputs − outputs`).
    ///
    /// Fails with [`BitcoinTxError::InsufficientFunds`] if outputs exceed inputs.
    pub fn get_fee_paid(&self) -> Result<u64, BitcoinTxError> {
        let output_amount = self.get_total_output()?;

        self.total_btc_input
            .checked_sub(output_amount)
            .ok_or(BitcoinTxError::InsufficientFunds {
                required: output_amount,
                available: self.total_btc_input,
            })
    }

    /// Appends a change output so that exactly `fee` is left for the miners.
    ///
    /// Returns the change value, or `None` when no change output was added: either the inputs
    /// match outputs plus fee exactly, or the change was dust and `change_policy` folded it into
    /// the fee.
    pub fn add_change_output(
        &mut self,
        change_script: ScriptBuf,
        fee: u64,
        change_policy: ChangePolicy,
    ) -> Result<Option<u64>, BitcoinTxError> {
        let spent = self
            .get_total_output()?
            .checked_add(fee)
            .ok_or(BitcoinTxError::AmountOverflow)?;

        let change = self
            .total_btc_input
            .checked_sub(spent)
            .ok_or(BitcoinTxError::InsufficientFunds {
                required: spent,
                available: self.total_btc_input,
            })?;

        if change == 0 {
            return Ok(None);
        }

        if change < P2WPKH_DUST_LIMIT && change_policy == ChangePolicy::FoldDustIntoFee {
            warn!(
                change,
                dust_limit = P2WPKH_DUST_LIMIT,
                "change below dust limit, paying it as fee"
            );
            return Ok(None);
        }

        self.change_output = Some(self.transaction.output.len());
        self.add_tx_output(change_script, change);

        Ok(Some(change))
    }

    /// Consumes the builder and produces the [`UnsignedTransaction`], attaching each spent output
    /// (and its full source transaction) to the matching input.
    pub fn finalize(self) -> Result<UnsignedTransaction, BitcoinTxError> {
        let fee = self.get_fee_paid()?;

        let mut psbt = Psbt::from_unsigned_tx(self.transaction)
            .map_err(|e| BitcoinTxError::InvalidPsbt(e.to_string()))?;

        for ((input, spent_output), source_tx) in psbt
            .inputs
            .iter_mut()
            .zip(self.spent_outputs)
            .zip(self.source_transactions)
        {
            input.witness_utxo = Some(spent_output);
            input.non_witness_utxo = Some(source_tx);
        }

        Ok(UnsignedTransaction {
            psbt,
            fee,
            change_output: self.change_output,
        })
    }
}

/// Deterministic keys and funding transactions for tests, here and in dependent crates.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;
    use bitcoin::{hashes::Hash, Network, OutPoint, Txid, WPubkeyHash};

    pub const SENDER_SECRET: &str =
        "1111111111111111111111111111111111111111111111111111111111111111";
    pub const RECEIVER_SECRET: &str =
        "2222222222222222222222222222222222222222222222222222222222222222";

    pub fn sender() -> KeyMaterial {
        KeyMaterial::from_secret_hex(SENDER_SECRET, Network::Testnet).unwrap()
    }

    pub fn receiver() -> KeyMaterial {
        KeyMaterial::from_secret_hex(RECEIVER_SECRET, Network::Testnet).unwrap()
    }

    /// A transaction paying `value` to `script_pubkey` at output `vout`, preceded by filler
    /// outputs, plus the matching [`UtxoInfo`].
    pub fn funding_transaction(
        script_pubkey: ScriptBuf,
        value: u64,
        vout: u32,
    ) -> (Transaction, UtxoInfo) {
        let mut output: Vec<TxOut> = (0..vout)
            .map(|i| TxOut {
                value: Amount::from_sat(10_000 + i as u64),
                script_pubkey: ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0xAA; 20])),
            })
            .collect();
        output.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey,
        });

        let transaction = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid: Txid::from_byte_array([0x42; 32]),
                    vout: 0,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::from_slice(&[vec![0x01; 72], vec![0x02; 33]]),
            }],
            output,
        };

        let utxo = UtxoInfo::new(transaction.compute_txid(), vout, value);

        (transaction, utxo)
    }

    pub fn payment(amount: u64, fee: u64) -> Payment {
        Payment {
            destination: receiver().script_pubkey(),
            amount,
            fee,
        }
    }

    /// Builds the default single-input transaction funded by `value` sats.
    pub fn unsigned_transaction(value: u64, amount: u64, fee: u64) -> UnsignedTransaction {
        let keys = sender();
        let (source_tx, utxo) = funding_transaction(keys.script_pubkey(), value, 0);

        TransactionBuilder::build(
            &utxo,
            &source_tx,
            &payment(amount, fee),
            keys.script_pubkey(),
            ChangePolicy::Emit,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use proptest::prelude::*;

    mod new {
        use super::*;

        #[test]
        fn creates_empty_transaction_builder() {
            let builder = TransactionBuilder::new();

            assert_eq!(builder.transaction.version, Version::TWO);
            assert_eq!(builder.transaction.lock_time, LockTime::ZERO);
            assert_eq!(builder.transaction.input.len(), 0);
            assert_eq!(builder.transaction.output.len(), 0);
            assert_eq!(builder.total_btc_input, 0);
            assert!(builder.spent_outputs.is_empty());
        }
    }

    mod build {
        use super::*;

        #[test]
        fn emits_change_when_utxo_exceeds_amount_plus_fee() {
            let keys = sender();
            let unsigned = unsigned_transaction(5000, 1000, 200);
            let tx = unsigned.transaction();

            assert_eq!(tx.input.len(), 1);
            assert_eq!(tx.output.len(), 2);
            assert_eq!(tx.output[0].value.to_sat(), 1000);
            assert_eq!(tx.output[0].script_pubkey, receiver().script_pubkey());
            assert_eq!(tx.output[1].value.to_sat(), 3800);
            assert_eq!(tx.output[1].script_pubkey, keys.script_pubkey());
            assert_eq!(unsigned.change(), Some(3800));
            assert_eq!(unsigned.fee(), 200);
        }

        #[test]
        fn omits_change_when_utxo_matches_exactly() {
            let unsigned = unsigned_transaction(1200, 1000, 200);
            let tx = unsigned.transaction();

            assert_eq!(tx.output.len(), 1);
            assert_eq!(tx.output[0].value.to_sat(), 1000);
            assert_eq!(unsigned.change(), None);
            assert_eq!(unsigned.fee(), 200);
        }

        #[test]
        fn fails_when_change_would_be_negative() {
            let keys = sender();
            let (source_tx, utxo) = funding_transaction(keys.script_pubkey(), 1000, 0);

            let result = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(1000, 200),
                keys.script_pubkey(),
                ChangePolicy::Emit,
            );

            assert_eq!(
                result,
                Err(BitcoinTxError::InsufficientFunds {
                    required: 1200,
                    available: 1000,
                })
            );
        }

        #[test]
        fn input_references_utxo_and_carries_spent_output() {
            let keys = sender();
            let (source_tx, utxo) = funding_transaction(keys.script_pubkey(), 5000, 2);

            let unsigned = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(1000, 200),
                keys.script_pubkey(),
                ChangePolicy::Emit,
            )
            .unwrap();

            let input = &unsigned.transaction().input[0];
            assert_eq!(input.previous_output, utxo.outpoint());
            assert!(input.script_sig.is_empty());
            assert!(input.witness.is_empty());
            assert_eq!(input.sequence, Sequence::MAX);

            let spent = unsigned.spent_output(0).unwrap();
            assert_eq!(spent.value.to_sat(), 5000);
            assert_eq!(spent.script_pubkey, keys.script_pubkey());
            assert_eq!(
                unsigned.psbt().inputs[0].non_witness_utxo.as_ref(),
                Some(&source_tx)
            );
        }

        #[test]
        fn keeps_dust_change_with_emit_policy() {
            let unsigned = unsigned_transaction(1300, 1000, 200);

            assert_eq!(unsigned.change(), Some(100));
            assert_eq!(unsigned.fee(), 200);
        }

        #[test]
        fn folds_dust_change_into_fee_when_requested() {
            let keys = sender();
            let (source_tx, utxo) = funding_transaction(keys.script_pubkey(), 1300, 0);

            let unsigned = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(1000, 200),
                keys.script_pubkey(),
                ChangePolicy::FoldDustIntoFee,
            )
            .unwrap();

            assert_eq!(unsigned.transaction().output.len(), 1);
            assert_eq!(unsigned.change(), None);
            assert_eq!(unsigned.fee(), 300);
        }

        #[test]
        fn fold_policy_keeps_change_at_dust_limit() {
            let keys = sender();
            let value = 1200 + P2WPKH_DUST_LIMIT;
            let (source_tx, utxo) = funding_transaction(keys.script_pubkey(), value, 0);

            let unsigned = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(1000, 200),
                keys.script_pubkey(),
                ChangePolicy::FoldDustIntoFee,
            )
            .unwrap();

            assert_eq!(unsigned.change(), Some(P2WPKH_DUST_LIMIT));
        }

        #[test]
        fn rejects_source_transaction_with_other_txid() {
            let keys = sender();
            let (_, utxo) = funding_transaction(keys.script_pubkey(), 5000, 0);
            let (other_tx, _) = funding_transaction(keys.script_pubkey(), 5001, 0);

            let result = TransactionBuilder::build(
                &utxo,
                &other_tx,
                &payment(1000, 200),
                keys.script_pubkey(),
                ChangePolicy::Emit,
            );

            assert!(matches!(
                result,
                Err(BitcoinTxError::SourceTransactionMismatch { .. })
            ));
        }

        #[test]
        fn rejects_value_reported_differently_by_indexer() {
            let keys = sender();
            let (source_tx, mut utxo) = funding_transaction(keys.script_pubkey(), 5000, 0);
            utxo.value = 6000;

            let result = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(1000, 200),
                keys.script_pubkey(),
                ChangePolicy::Emit,
            );

            assert!(matches!(
                result,
                Err(BitcoinTxError::SourceTransactionMismatch { .. })
            ));
        }

        #[test]
        fn rejects_missing_output_index() {
            let keys = sender();
            let (source_tx, mut utxo) = funding_transaction(keys.script_pubkey(), 5000, 0);
            utxo.vout = 3;

            let result = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(1000, 200),
                keys.script_pubkey(),
                ChangePolicy::Emit,
            );

            assert!(matches!(
                result,
                Err(BitcoinTxError::SourceTransactionMismatch { .. })
            ));
        }

        #[test]
        fn rejects_non_segwit_spent_output() {
            let keys = sender();
            let legacy = ScriptBuf::new_p2pkh(&keys.public_key().pubkey_hash());
            let (source_tx, utxo) = funding_transaction(legacy.clone(), 5000, 0);

            let result = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(1000, 200),
                keys.script_pubkey(),
                ChangePolicy::Emit,
            );

            assert_eq!(result, Err(BitcoinTxError::UnsupportedSpendScript(legacy)));
        }

        #[test]
        fn rejects_overflowing_payment() {
            let keys = sender();
            let (source_tx, utxo) = funding_transaction(keys.script_pubkey(), 5000, 0);

            let result = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(u64::MAX, 1),
                keys.script_pubkey(),
                ChangePolicy::Emit,
            );

            assert_eq!(result, Err(BitcoinTxError::AmountOverflow));
        }
    }

    mod get_fee_paid {
        use super::*;

        #[test]
        fn fails_when_outputs_exceed_inputs() {
            let mut builder = TransactionBuilder::new();
            builder.add_tx_output(receiver().script_pubkey(), 1);

            assert_eq!(
                builder.get_fee_paid(),
                Err(BitcoinTxError::InsufficientFunds {
                    required: 1,
                    available: 0,
                })
            );
        }
    }

    proptest! {
        #[test]
        fn change_is_exact_difference(
            value in 0u64..100_000,
            amount in 1u64..50_000,
            fee in 0u64..5_000,
        ) {
            let keys = sender();
            let (source_tx, utxo) = funding_transaction(keys.script_pubkey(), value, 0);

            let result = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &payment(amount, fee),
                keys.script_pubkey(),
                ChangePolicy::Emit,
            );

            let required = amount + fee;
            if value < required {
                let is_insufficient = matches!(result, Err(BitcoinTxError::InsufficientFunds { .. }));
                prop_assert!(is_insufficient);
            } else {
                let unsigned = result.unwrap();
                let outputs: u64 = unsigned
                    .transaction()
                    .output
                    .iter()
                    .map(|output| output.value.to_sat())
                    .sum();

                prop_assert_eq!(outputs + unsigned.fee(), value);
                if value == required {
                    prop_assert_eq!(unsigned.change(), None);
                    prop_assert_eq!(unsigned.transaction().output.len(), 1);
                } else {
                    prop_assert_eq!(unsigned.change(), Some(value - required));
                    prop_assert_eq!(unsigned.transaction().output.len(), 2);
                }
            }
        }
    }
}
