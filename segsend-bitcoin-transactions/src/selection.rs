use crate::{error::BitcoinTxError, utxo_info::UtxoInfo};

/// Picks the first UTXO, in the order given, whose value covers `minimum_value`.
///
/// The rule is deliberately naive: it never combines inputs and does not look
/// for the smallest sufficient output, so the indexer's ordering decides which
/// coin gets spent.
///
/// # Errors
/// * [`BitcoinTxError::NoFunds`] – `utxos` is empty.
/// * [`BitcoinTxError::InsufficientFunds`] – no single UTXO is large enough; `available`
///   reports the largest value seen.
pub fn select_utxo<T: AsRef<UtxoInfo>>(
    utxos: &[T],
    minimum_value: u64,
) -> Result<&UtxoInfo, BitcoinTxError> {
    if utxos.is_empty() {
        return Err(BitcoinTxError::NoFunds);
    }

    utxos
        .iter()
        .map(AsRef::as_ref)
        .find(|utxo| utxo.value >= minimum_value)
        .ok_or_else(|| BitcoinTxError::InsufficientFunds {
            required: minimum_value,
            available: utxos
                .iter()
                .map(|utxo| utxo.as_ref().value)
                .max()
                .unwrap_or(0),
        })
}
