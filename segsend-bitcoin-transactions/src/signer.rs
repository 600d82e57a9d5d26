use bitcoin::{
    ecdsa,
    key::CompressedPublicKey,
    psbt::Psbt,
    secp256k1::{Message, Secp256k1, Verification},
    sighash::{EcdsaSighashType, SighashCache},
    PublicKey, ScriptBuf, Witness,
};
use tracing::debug;

use crate::{
    error::BitcoinTxError, keys::KeyMaterial, signed_transaction::SignedTransaction,
    UnsignedTransaction,
};

/// Signing state between [`UnsignedTransaction`] and [`SignedTransaction`].
///
/// Inputs are signed one at a time with [`Self::sign_input`]; each signature lands in the
/// input's partial signature map. [`Self::finalize`] turns every input's signature into a
/// `[signature, pubkey]` witness stack.
#[derive(Clone, Debug, PartialEq)]
pub struct PartiallySignedTransaction {
    psbt: Psbt,
    fee: u64,
    change_output: Option<usize>,
}

impl From<UnsignedTransaction> for PartiallySignedTransaction {
    fn from(unsigned: UnsignedTransaction) -> Self {
        let (psbt, fee, change_output) = unsigned.into_parts();

        Self {
            psbt,
            fee,
            change_output,
        }
    }
}

impl PartiallySignedTransaction {
    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn change(&self) -> Option<u64> {
        self.change_output
            .map(|index| self.psbt.unsigned_tx.output[index].value.to_sat())
    }

    /// Whether input `index` already has a signature or a final witness.
    pub fn is_input_signed(&self, index: usize) -> bool {
        self.psbt.inputs.get(index).is_some_and(|input| {
            !input.partial_sigs.is_empty() || input.final_script_witness.is_some()
        })
    }

    /// Computes the BIP143 signature hash of input `input_index` over its witness UTXO, signs it
    /// with `keys` and records the signature under the key's public key.
    ///
    /// # Errors
    /// * [`BitcoinTxError::InputIndexOutOfRange`]
    /// * [`BitcoinTxError::KeyMismatch`] – the spent output is not locked to `keys`.
    /// * [`BitcoinTxError::SigningFailed`] – the signature hash could not be computed.
    pub fn sign_input(
        &mut self,
        keys: &KeyMaterial,
        input_index: usize,
    ) -> Result<(), BitcoinTxError> {
        let spent_script = self.spent_script(input_index)?;
        if spent_script != keys.script_pubkey() {
            return Err(BitcoinTxError::KeyMismatch(input_index));
        }

        let (message, sighash_type) = self.sighash(input_index)?;

        let secp = Secp256k1::signing_only();
        let signature = ecdsa::Signature {
            signature: secp.sign_ecdsa(&message, keys.secret_key()),
            sighash_type,
        };

        self.psbt.inputs[input_index]
            .partial_sigs
            .insert(keys.public_key(), signature);

        debug!(input_index, address = %keys.address(), "signed input");

        Ok(())
    }

    /// Moves every input's signature into its final witness and extracts the transaction.
    /// No fee rate limit is applied.
    ///
    /// Signatures are verified against the input's signature hash before being accepted. Inputs
    /// that already carry a final witness are left untouched, so finalizing twice yields the
    /// same transaction.
    ///
    /// # Errors
    /// * [`BitcoinTxError::FinalizationError`] – an input has no signature from the key its
    ///   spent output commits to, or that signature does not verify.
    pub fn finalize(&mut self) -> Result<SignedTransaction, BitcoinTxError> {
        let secp = Secp256k1::verification_only();

        for index in 0..self.psbt.inputs.len() {
            if self.psbt.inputs[index].final_script_witness.is_some() {
                continue;
            }

            let witness = self.completed_witness(&secp, index)?;

            let input = &mut self.psbt.inputs[index];
            input.final_script_witness = Some(witness);
            input.partial_sigs.clear();
            input.sighash_type = None;
            input.bip32_derivation.clear();
        }

        let transaction = self.psbt.clone().extract_tx_unchecked_fee_rate();

        SignedTransaction::new(transaction)
    }

    fn completed_witness<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        index: usize,
    ) -> Result<Witness, BitcoinTxError> {
        let incomplete = |reason: &str| BitcoinTxError::FinalizationError {
            index,
            reason: reason.to_string(),
        };

        let spent_script = self
            .spent_script(index)
            .map_err(|_| incomplete("missing spent output"))?;

        let (public_key, signature) = self.psbt.inputs[index]
            .partial_sigs
            .iter()
            .find(|(public_key, _)| commits_to(&spent_script, public_key))
            .ok_or_else(|| incomplete("no signature from the key the spent output commits to"))?;

        let (message, _) = self
            .sighash(index)
            .map_err(|_| incomplete("signature hash unavailable"))?;

        secp.verify_ecdsa(&message, &signature.signature, &public_key.inner)
            .map_err(|_| incomplete("signature does not verify"))?;

        let mut witness = Witness::new();
        witness.push(signature.serialize());
        witness.push(public_key.inner.serialize());

        Ok(witness)
    }

    fn spent_script(&self, index: usize) -> Result<ScriptBuf, BitcoinTxError> {
        let inputs = self.psbt.inputs.len();
        let input = self
            .psbt
            .inputs
            .get(index)
            .ok_or(BitcoinTxError::InputIndexOutOfRange { index, inputs })?;

        input
            .witness_utxo
            .as_ref()
            .map(|utxo| utxo.script_pubkey.clone())
            .ok_or_else(|| BitcoinTxError::SigningFailed {
                index,
                reason: "input has no witness utxo".to_string(),
            })
    }

    fn sighash(&self, index: usize) -> Result<(Message, EcdsaSighashType), BitcoinTxError> {
        let mut cache = SighashCache::new(&self.psbt.unsigned_tx);

        self.psbt
            .sighash_ecdsa(index, &mut cache)
            .map_err(|e| BitcoinTxError::SigningFailed {
                index,
                reason: e.to_string(),
            })
    }
}

fn commits_to(script_pubkey: &ScriptBuf, public_key: &PublicKey) -> bool {
    public_key.compressed
        && ScriptBuf::new_p2wpkh(&CompressedPublicKey(public_key.inner).wpubkey_hash())
            == *script_pubkey
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{funding_transaction, payment, receiver, sender, unsigned_transaction},
        ChangePolicy, TransactionBuilder,
    };

    mod sign_input {
        use super::*;

        #[test]
        fn records_signature_under_sender_key() {
            let keys = sender();

            let partially_signed = unsigned_transaction(5000, 1000, 200).sign(&keys, 0).unwrap();

            let input = &partially_signed.psbt().inputs[0];
            assert_eq!(input.partial_sigs.len(), 1);
            let signature = input.partial_sigs.get(&keys.public_key()).unwrap();
            assert_eq!(signature.sighash_type, EcdsaSighashType::All);
            assert!(partially_signed.is_input_signed(0));
            assert!(input.final_script_witness.is_none());
        }

        #[test]
        fn rejects_out_of_range_index() {
            let err = unsigned_transaction(5000, 1000, 200)
                .sign(&sender(), 1)
                .unwrap_err();

            assert_eq!(
                err,
                BitcoinTxError::InputIndexOutOfRange {
                    index: 1,
                    inputs: 1,
                }
            );
        }

        #[test]
        fn rejects_key_that_does_not_own_the_input() {
            let err = unsigned_transaction(5000, 1000, 200)
                .sign(&receiver(), 0)
                .unwrap_err();

            assert_eq!(err, BitcoinTxError::KeyMismatch(0));
        }
    }

    mod finalize {
        use super::*;

        #[test]
        fn builds_signature_and_pubkey_witness() {
            let keys = sender();
            let mut partially_signed =
                unsigned_transaction(5000, 1000, 200).sign(&keys, 0).unwrap();

            let signed = partially_signed.finalize().unwrap();

            let witness = &signed.transaction().input[0].witness;
            assert_eq!(witness.len(), 2);
            assert_eq!(witness.nth(1), Some(&keys.public_key().inner.serialize()[..]));
            // DER signature followed by the SIGHASH_ALL byte.
            let signature = witness.nth(0).unwrap();
            assert_eq!(signature[0], 0x30);
            assert_eq!(*signature.last().unwrap(), 0x01);
            assert!(signed.transaction().input[0].script_sig.is_empty());
            assert!(partially_signed.psbt().inputs[0].partial_sigs.is_empty());
        }

        #[test]
        fn fails_for_unsigned_input() {
            let mut partially_signed =
                PartiallySignedTransaction::from(unsigned_transaction(5000, 1000, 200));

            let err = partially_signed.finalize().unwrap_err();

            assert!(matches!(
                err,
                BitcoinTxError::FinalizationError { index: 0, .. }
            ));
            assert!(!partially_signed.is_input_signed(0));
        }

        #[test]
        fn fails_for_tampered_signature() {
            let keys = sender();
            let mut partially_signed =
                unsigned_transaction(5000, 1000, 200).sign(&keys, 0).unwrap();

            // A valid signature over a different transaction must not be accepted.
            let other = unsigned_transaction(6000, 1000, 200).sign(&keys, 0).unwrap();
            let foreign = other.psbt().inputs[0].partial_sigs[&keys.public_key()];
            partially_signed.psbt.inputs[0]
                .partial_sigs
                .insert(keys.public_key(), foreign);

            let err = partially_signed.finalize().unwrap_err();

            assert_eq!(
                err,
                BitcoinTxError::FinalizationError {
                    index: 0,
                    reason: "signature does not verify".to_string(),
                }
            );
        }

        #[test]
        fn accepts_any_fixed_fee() {
            let mut partially_signed = unsigned_transaction(5_000_000, 1000, 4_000_000)
                .sign(&sender(), 0)
                .unwrap();

            let signed = partially_signed.finalize().unwrap();

            assert_eq!(partially_signed.fee(), 4_000_000);
            assert_eq!(partially_signed.change(), Some(999_000));
            assert_eq!(signed.transaction().input[0].witness.len(), 2);
        }

        #[test]
        fn is_idempotent() {
            let mut partially_signed = unsigned_transaction(5000, 1000, 200)
                .sign(&sender(), 0)
                .unwrap();

            let first = partially_signed.finalize().unwrap();
            let second = partially_signed.finalize().unwrap();

            assert_eq!(first.serialize(), second.serialize());
            assert_eq!(first, second);
        }

        #[test]
        fn signs_and_finalizes_multiple_inputs_one_by_one() {
            let keys = sender();
            let (first_tx, first_utxo) = funding_transaction(keys.script_pubkey(), 3000, 0);
            let (second_tx, second_utxo) = funding_transaction(keys.script_pubkey(), 4000, 1);

            let mut builder = TransactionBuilder::new();
            builder.add_tx_input(&first_utxo, &first_tx).unwrap();
            builder.add_tx_input(&second_utxo, &second_tx).unwrap();
            let payment = payment(5000, 300);
            builder.add_tx_output(payment.destination.clone(), payment.amount);
            builder
                .add_change_output(keys.script_pubkey(), payment.fee, ChangePolicy::Emit)
                .unwrap();
            let unsigned = builder.finalize().unwrap();
            assert_eq!(unsigned.change(), Some(1700));

            let mut partially_signed = unsigned.sign(&keys, 0).unwrap();
            assert!(partially_signed.finalize().is_err());

            partially_signed.sign_input(&keys, 1).unwrap();
            let signed = partially_signed.finalize().unwrap();

            assert!(signed
                .transaction()
                .input
                .iter()
                .all(|input| input.witness.len() == 2));
        }
    }
}
